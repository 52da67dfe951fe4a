//! Erasure-coding engine interface
//!
//! The recovery pipeline only needs three things from a coding engine: an
//! allocator for buffers the engine can work on directly, a call that folds a
//! batch of input slices into a set of recovery buffers, and a finalisation
//! step run once all inputs have been folded in. [`Gf16Engine`] is the bundled
//! PAR2 Vandermonde implementation; anything else implementing
//! [`RecoveryEngine`] can be plugged into [`crate::Par2`] instead.

pub mod aligned;
pub mod galois;
pub mod gf16;

pub use aligned::{is_aligned, AlignedBuffer};
pub use gf16::{Gf16Engine, MAX_INPUT_SLICES};

use thiserror::Error;

/// Errors reported by a coding engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Buffer is not aligned to {0} bytes")]
    Misaligned(usize),

    #[error("Buffer length {actual} does not match {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Buffer length {0} is not a whole number of 16-bit words")]
    OddLength(usize),

    #[error("{buffers} buffers but {indices} indices")]
    CountMismatch { buffers: usize, indices: usize },

    #[error("Input slice index {0} exceeds the GF(2^16) limit of {MAX_INPUT_SLICES}")]
    TooManyInputs(u32),
}

/// A coding engine that turns input slices into recovery slices
///
/// `generate` must be deterministic and linear: the result of several calls in
/// merge mode equals one call over the union of their inputs. Callers
/// rely on that to batch inputs freely.
pub trait RecoveryEngine {
    /// Required start alignment of every buffer passed to the engine
    fn alignment(&self) -> usize;

    /// Allocate a zeroed buffer satisfying [`RecoveryEngine::alignment`]
    fn alloc(&self, len: usize) -> AlignedBuffer {
        AlignedBuffer::zeroed(len, self.alignment())
    }

    /// Fold `inputs` into every output buffer
    ///
    /// `input_indices[i]` is the global slice number of `inputs[i]` and
    /// `exponents[j]` the recovery exponent of `outputs[j]`. With `merge` false
    /// the outputs are overwritten with this batch's contribution; with `merge`
    /// true the contribution is added to what is already there.
    fn generate(
        &self,
        inputs: &[&[u8]],
        input_indices: &[u32],
        outputs: &mut [&mut [u8]],
        exponents: &[u16],
        merge: bool,
    ) -> Result<(), EngineError>;

    /// Bring every output buffer into its final byte layout
    fn finalise(&self, outputs: &mut [&mut [u8]]) -> Result<(), EngineError>;
}
