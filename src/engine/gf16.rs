//! PAR2 Vandermonde encoder over GF(2^16)
//!
//! Recovery slice `e` is the sum over every input slice `i` of
//! `base_i^e * input_i`, computed word by word on 16-bit little-endian words.
//! `base_i` is `2^l_i` where `l_i` is the i-th logarithm coprime to 65535,
//! the same base selection par2cmdline uses, so the output interoperates with
//! every other PAR2 client.
//!
//! Multiplication by a constant uses split low/high byte tables: two 256-entry
//! tables per coefficient instead of one 65536-entry table.

use super::aligned::is_aligned;
use super::galois::{gcd, Galois16, LIMIT};
use super::{EngineError, RecoveryEngine};
use log::{debug, trace};
use rayon::prelude::*;
use std::sync::OnceLock;

/// Number of usable input bases (logarithms coprime to 65535)
pub const MAX_INPUT_SLICES: usize = 32768;

/// Alignment used when no other is configured (one AVX-512 register)
pub const DEFAULT_ALIGNMENT: usize = 64;

fn input_bases() -> &'static [Galois16] {
    static BASES: OnceLock<Vec<Galois16>> = OnceLock::new();
    BASES.get_or_init(|| {
        (0..LIMIT)
            .filter(|&log| gcd(LIMIT, log) == 1)
            .map(Galois16::from_log)
            .collect()
    })
}

/// Vandermonde base for the input slice with global index `index`
pub fn input_base(index: u32) -> Result<Galois16, EngineError> {
    input_bases()
        .get(index as usize)
        .copied()
        .ok_or(EngineError::TooManyInputs(index))
}

/// Multiplication table split into low/high byte tables
pub struct SplitMulTable {
    pub low: [u16; 256],
    pub high: [u16; 256],
}

impl SplitMulTable {
    /// Tables for multiplying by `coefficient`
    pub fn new(coefficient: Galois16) -> Self {
        let mut low = [0u16; 256];
        let mut high = [0u16; 256];
        if coefficient.value() != 0 {
            for i in 0..256u16 {
                low[i as usize] = (Galois16::new(i) * coefficient).value();
                high[i as usize] = (Galois16::new(i << 8) * coefficient).value();
            }
        }
        SplitMulTable { low, high }
    }

    #[inline]
    fn apply(&self, word: u16) -> u16 {
        self.low[(word & 0xFF) as usize] ^ self.high[(word >> 8) as usize]
    }
}

fn as_words(data: &[u8]) -> Result<&[u16], EngineError> {
    bytemuck::try_cast_slice(data).map_err(|_| EngineError::OddLength(data.len()))
}

fn as_words_mut(data: &mut [u8]) -> Result<&mut [u16], EngineError> {
    let len = data.len();
    bytemuck::try_cast_slice_mut(data).map_err(|_| EngineError::OddLength(len))
}

/// output = coefficient * input
fn multiply_into(input: &[u16], output: &mut [u16], tables: &SplitMulTable) {
    for (out, &word) in output.iter_mut().zip(input) {
        *out = tables.apply(u16::from_le(word)).to_le();
    }
}

/// output += coefficient * input
fn multiply_add(input: &[u16], output: &mut [u16], tables: &SplitMulTable) {
    for (out, &word) in output.iter_mut().zip(input) {
        *out ^= tables.apply(u16::from_le(word)).to_le();
    }
}

/// Table-driven GF(2^16) engine
#[derive(Debug, Clone)]
pub struct Gf16Engine {
    alignment: usize,
}

impl Default for Gf16Engine {
    fn default() -> Self {
        Self::new(DEFAULT_ALIGNMENT)
    }
}

impl Gf16Engine {
    /// Engine requiring buffers aligned to `alignment` (rounded up to a power of two)
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment: alignment.max(2).next_power_of_two(),
        }
    }

    fn check_buffer(&self, data: &[u8], expected_len: usize) -> Result<(), EngineError> {
        if data.len() != expected_len {
            return Err(EngineError::LengthMismatch {
                expected: expected_len,
                actual: data.len(),
            });
        }
        if !is_aligned(data, self.alignment) {
            return Err(EngineError::Misaligned(self.alignment));
        }
        if expected_len % 2 != 0 {
            return Err(EngineError::OddLength(expected_len));
        }
        Ok(())
    }
}

impl RecoveryEngine for Gf16Engine {
    fn alignment(&self) -> usize {
        self.alignment
    }

    fn generate(
        &self,
        inputs: &[&[u8]],
        input_indices: &[u32],
        outputs: &mut [&mut [u8]],
        exponents: &[u16],
        merge: bool,
    ) -> Result<(), EngineError> {
        if inputs.len() != input_indices.len() {
            return Err(EngineError::CountMismatch {
                buffers: inputs.len(),
                indices: input_indices.len(),
            });
        }
        if outputs.len() != exponents.len() {
            return Err(EngineError::CountMismatch {
                buffers: outputs.len(),
                indices: exponents.len(),
            });
        }
        let Some(unit) = outputs.first().map(|o| o.len()) else {
            return Ok(());
        };
        for input in inputs {
            self.check_buffer(input, unit)?;
        }
        for output in outputs.iter() {
            self.check_buffer(output, unit)?;
        }

        let bases = input_indices
            .iter()
            .map(|&index| input_base(index))
            .collect::<Result<Vec<_>, _>>()?;
        let input_words = inputs
            .iter()
            .map(|input| as_words(input))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "GF16 generate: {} inputs x {} outputs, {} bytes, merge={}",
            inputs.len(),
            outputs.len(),
            unit,
            merge
        );

        outputs
            .par_iter_mut()
            .zip(exponents.par_iter())
            .try_for_each(|(output, &exponent)| {
                let output = as_words_mut(output)?;
                if !merge && input_words.is_empty() {
                    output.fill(0);
                }
                for (k, (words, base)) in input_words.iter().zip(&bases).enumerate() {
                    let tables = SplitMulTable::new(base.pow(exponent));
                    if k == 0 && !merge {
                        multiply_into(words, output, &tables);
                    } else {
                        multiply_add(words, output, &tables);
                    }
                }
                Ok(())
            })
    }

    fn finalise(&self, outputs: &mut [&mut [u8]]) -> Result<(), EngineError> {
        // Words are written little-endian as they are produced; nothing to convert.
        for output in outputs.iter() {
            if !is_aligned(output, self.alignment) {
                return Err(EngineError::Misaligned(self.alignment));
            }
        }
        trace!("GF16 finalise over {} outputs", outputs.len());
        Ok(())
    }
}
