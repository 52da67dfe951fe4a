use super::build_packet;
use crate::domain::{Crc32Value, FileId, Md5Hash, RecoverySetId};
use crate::error::Result;
use binrw::helpers::until_eof;
use binrw::{BinRead, BinWrite};

pub const TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0IFSC\0\0\0\0";

/// MD5 and CRC32 of one zero-padded slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
#[brw(little)]
pub struct SliceChecksumEntry {
    pub md5: [u8; 16],
    pub crc32: u32,
}

impl SliceChecksumEntry {
    pub fn new(md5: Md5Hash, crc32: Crc32Value) -> Self {
        Self {
            md5: *md5.as_bytes(),
            crc32: crc32.as_u32(),
        }
    }
}

/// Input file slice checksum body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct InputFileSliceChecksumBody {
    pub file_id: [u8; 16],
    #[br(parse_with = until_eof)]
    pub slice_checksums: Vec<SliceChecksumEntry>,
}

impl InputFileSliceChecksumBody {
    pub fn new(file_id: &FileId, slice_checksums: Vec<SliceChecksumEntry>) -> Self {
        Self {
            file_id: *file_id.as_bytes(),
            slice_checksums,
        }
    }

    pub fn to_packet(&self, set_id: &RecoverySetId) -> Result<Vec<u8>> {
        build_packet(self, set_id, TYPE_OF_PACKET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::decode_body;

    #[test]
    fn test_crc_is_stored_little_endian() {
        let entry = SliceChecksumEntry::new(Md5Hash::new([0xAA; 16]), Crc32Value::new(0x11223344));
        let body = InputFileSliceChecksumBody::new(&FileId::new([1; 16]), vec![entry]);
        let packet = body.to_packet(&RecoverySetId::default()).unwrap();

        assert_eq!(packet.len(), 64 + 16 + 20);
        assert_eq!(&packet[80..96], &[0xAA; 16]);
        assert_eq!(&packet[96..100], &[0x44, 0x33, 0x22, 0x11]);

        let (_, decoded) = decode_body::<InputFileSliceChecksumBody>(&packet).unwrap();
        assert_eq!(decoded.slice_checksums, vec![entry]);
    }
}
