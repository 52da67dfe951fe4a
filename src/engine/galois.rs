//! GF(2^16) arithmetic for PAR2 recovery generation
//!
//! PAR2 fixes the field generator at 0x1100B (x¹⁶ + x¹² + x³ + x + 1); any
//! other polynomial produces recovery data no other client can use.

use std::ops::{Add, Mul};
use std::sync::OnceLock;

const GF16_GENERATOR: u32 = 0x1100B;
const COUNT: usize = 1 << 16;
/// Multiplicative group order
pub const LIMIT: u32 = (COUNT - 1) as u32;

/// Log/antilog tables for GF(2^16)
pub struct GaloisTable {
    pub log: Vec<u16>,
    pub antilog: Vec<u16>,
}

impl GaloisTable {
    fn build() -> Self {
        let mut log = vec![0u16; COUNT];
        let mut antilog = vec![0u16; COUNT];

        let mut b = 1u32;
        for l in 0..LIMIT as usize {
            log[b as usize] = l as u16;
            antilog[l] = b as u16;

            b <<= 1;
            if b & COUNT as u32 != 0 {
                b ^= GF16_GENERATOR;
            }
        }

        log[0] = LIMIT as u16;
        antilog[LIMIT as usize] = 0;

        GaloisTable { log, antilog }
    }

    /// Process-wide tables, built on first use
    pub fn get() -> &'static GaloisTable {
        static TABLE: OnceLock<GaloisTable> = OnceLock::new();
        TABLE.get_or_init(GaloisTable::build)
    }
}

/// Element of GF(2^16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Galois16(u16);

impl Galois16 {
    pub const fn new(value: u16) -> Self {
        Galois16(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Element whose logarithm is `log`
    pub fn from_log(log: u32) -> Self {
        Galois16(GaloisTable::get().antilog[(log % LIMIT) as usize])
    }

    pub fn pow(&self, exponent: u16) -> Self {
        if self.0 == 0 {
            return Galois16(0);
        }
        let table = GaloisTable::get();
        let log = table.log[self.0 as usize] as u32;
        Galois16(table.antilog[((log * exponent as u32) % LIMIT) as usize])
    }
}

impl Add for Galois16 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Galois16(self.0 ^ rhs.0)
    }
}

impl Mul for Galois16 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        if self.0 == 0 || rhs.0 == 0 {
            return Galois16(0);
        }
        let table = GaloisTable::get();
        let log_sum = (table.log[self.0 as usize] as u32 + table.log[rhs.0 as usize] as u32) % LIMIT;
        Galois16(table.antilog[log_sum as usize])
    }
}

/// GCD function as used in par2cmdline
pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    if a == 0 || b == 0 {
        return 0;
    }
    while a != 0 && b != 0 {
        if a > b {
            a %= b;
        } else {
            b %= a;
        }
    }
    a + b
}
