//! Core domain types for PAR2 creation
//!
//! Newtypes for the three kinds of 16-byte values that flow through the encoder
//! (file IDs, recovery set IDs and plain MD5 digests), CRC32 values and the two
//! slice-numbering spaces. Keeping them distinct stops a file ID from being
//! written where a set ID belongs, or a per-file slice number from being handed
//! to the coding engine as a global one.

use std::fmt;

macro_rules! digest_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 16]);

        impl $name {
            pub const fn new(bytes: [u8; 16]) -> Self {
                $name(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                $name(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl PartialEq<[u8; 16]> for $name {
            fn eq(&self, other: &[u8; 16]) -> bool {
                &self.0 == other
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

digest_newtype!(
    /// PAR2 file identifier: MD5(md5_16k || length || name)
    ///
    /// Ordering is plain unsigned lexicographic byte order, which is the order
    /// file IDs must appear in within the main packet.
    FileId
);

digest_newtype!(
    /// Recovery set identifier, the MD5 of the main packet body
    RecoverySetId
);

digest_newtype!(
    /// An MD5 digest of file or slice contents
    Md5Hash
);

/// CRC32 checksum of a zero-padded slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Crc32Value(u32);

impl Crc32Value {
    pub fn new(value: u32) -> Self {
        Crc32Value(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Byte order used in IFSC packets
    ///
    /// CRC engines conventionally print the value most significant byte first;
    /// PAR2 stores the reverse.
    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for Crc32Value {
    fn from(value: u32) -> Self {
        Crc32Value(value)
    }
}

impl fmt::Display for Crc32Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Slice number across every file in the recovery set
///
/// This is the number the coding engine sees; it selects the input's
/// Vandermonde base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GlobalSliceIndex(u32);

impl GlobalSliceIndex {
    pub fn new(index: u32) -> Self {
        GlobalSliceIndex(index)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for GlobalSliceIndex {
    fn from(index: u32) -> Self {
        GlobalSliceIndex(index)
    }
}

impl fmt::Display for GlobalSliceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slice number within a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LocalSliceIndex(u32);

impl LocalSliceIndex {
    pub fn new(index: u32) -> Self {
        LocalSliceIndex(index)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Convert to a global index given the file's first global slice
    pub fn to_global(self, offset: GlobalSliceIndex) -> GlobalSliceIndex {
        GlobalSliceIndex(offset.0 + self.0)
    }
}

impl fmt::Display for LocalSliceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_order_as_unsigned_bytes() {
        let mut low = [0u8; 16];
        low[0] = 0x7f;
        let mut high = [0u8; 16];
        high[0] = 0x80;

        assert!(FileId::new(low) < FileId::new(high));
    }

    #[test]
    fn local_to_global() {
        let global = LocalSliceIndex::new(3).to_global(GlobalSliceIndex::new(10));
        assert_eq!(global, GlobalSliceIndex::new(13));
    }

    #[test]
    fn display_is_lower_hex() {
        let id = RecoverySetId::new([0xab; 16]);
        assert_eq!(id.to_string(), "ab".repeat(16));
        assert_eq!(Crc32Value::new(0x1234).to_string(), "00001234");
    }

    #[test]
    fn crc_le_bytes_reverse_the_printed_order() {
        let crc = Crc32Value::new(0x0a0b0c0d);
        assert_eq!(crc.to_le_bytes(), [0x0d, 0x0c, 0x0b, 0x0a]);
    }
}
