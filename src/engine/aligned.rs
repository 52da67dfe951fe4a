//! Aligned byte buffers for the coding engine

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Zero-initialised byte buffer whose first byte sits on an alignment boundary
///
/// Backed by an over-allocated `Vec<u8>`; the usable window starts at the
/// first aligned address inside it. Sub-slices taken at offsets that are
/// multiples of the alignment stay aligned.
pub struct AlignedBuffer {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
    alignment: usize,
}

impl AlignedBuffer {
    /// Allocate `len` zero bytes aligned to `alignment`
    ///
    /// `alignment` is rounded up to a power of two.
    pub fn zeroed(len: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1).next_power_of_two();
        let storage = vec![0u8; len + alignment - 1];
        let addr = storage.as_ptr() as usize;
        let offset = (alignment - addr % alignment) % alignment;
        Self {
            storage,
            offset,
            len,
            alignment,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl Clone for AlignedBuffer {
    // A plain Vec clone could land on a different alignment
    fn clone(&self) -> Self {
        let mut copy = AlignedBuffer::zeroed(self.len, self.alignment);
        copy.copy_from_slice(self.as_slice());
        copy
    }
}

impl fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

/// Whether `data` starts on an `alignment` boundary
#[inline]
pub fn is_aligned(data: &[u8], alignment: usize) -> bool {
    alignment <= 1 || (data.as_ptr() as usize) % alignment == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_aligned_and_zeroed() {
        for alignment in [1, 2, 16, 64, 256] {
            let buf = AlignedBuffer::zeroed(1000, alignment);
            assert_eq!(buf.len(), 1000);
            assert!(is_aligned(&buf, alignment));
            assert!(buf.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_alignment_rounds_to_power_of_two() {
        let buf = AlignedBuffer::zeroed(10, 48);
        assert_eq!(buf.alignment(), 64);
        assert!(is_aligned(&buf, 64));
    }

    #[test]
    fn test_aligned_offset_stays_aligned() {
        let buf = AlignedBuffer::zeroed(512, 64);
        assert!(is_aligned(&buf[128..], 64));
        assert!(!is_aligned(&buf[4..], 64));
    }

    #[test]
    fn test_clone_keeps_contents_and_alignment() {
        let mut buf = AlignedBuffer::zeroed(33, 32);
        buf[5] = 9;
        let copy = buf.clone();
        assert_eq!(copy.as_slice(), buf.as_slice());
        assert!(is_aligned(&copy, 32));
    }

    #[test]
    fn test_empty_buffer() {
        let buf = AlignedBuffer::zeroed(0, 64);
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice(), &[] as &[u8]);
    }
}
