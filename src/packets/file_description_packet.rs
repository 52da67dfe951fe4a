use super::text::padded_utf16;
use super::build_packet;
use crate::domain::{FileId, Md5Hash, RecoverySetId};
use crate::error::Result;
use binrw::helpers::until_eof;
use binrw::{BinRead, BinWrite};

pub const TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0FileDesc";

/// Packet type of the Unicode file name packet
///
/// The identifier is 15 characters padded with a NUL, the same as every
/// other PAR2 client writes it.
pub const UNICODE_TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0UniFileN";

/// File description body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct FileDescriptionBody {
    pub file_id: [u8; 16],
    pub md5_hash: [u8; 16],
    pub md5_16k: [u8; 16],
    pub file_length: u64,
    /// 8-bit name, zero padded to 4 bytes
    #[br(parse_with = until_eof)]
    pub file_name: Vec<u8>,
}

impl FileDescriptionBody {
    pub fn new(
        file_id: &FileId,
        md5_hash: &Md5Hash,
        md5_16k: &Md5Hash,
        file_length: u64,
        padded_name: Vec<u8>,
    ) -> Self {
        Self {
            file_id: *file_id.as_bytes(),
            md5_hash: *md5_hash.as_bytes(),
            md5_16k: *md5_16k.as_bytes(),
            file_length,
            file_name: padded_name,
        }
    }

    pub fn to_packet(&self, set_id: &RecoverySetId) -> Result<Vec<u8>> {
        build_packet(self, set_id, TYPE_OF_PACKET)
    }
}

/// Unicode file name body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct UnicodeFileNameBody {
    pub file_id: [u8; 16],
    /// UTF-16LE name, zero padded to 4 bytes
    #[br(parse_with = until_eof)]
    pub file_name: Vec<u8>,
}

impl UnicodeFileNameBody {
    pub fn new(file_id: &FileId, name: &str) -> Self {
        Self {
            file_id: *file_id.as_bytes(),
            file_name: padded_utf16(name),
        }
    }

    pub fn to_packet(&self, set_id: &RecoverySetId) -> Result<Vec<u8>> {
        build_packet(self, set_id, UNICODE_TYPE_OF_PACKET)
    }

    /// Decoded name with padding stripped
    pub fn name(&self) -> String {
        let units: Vec<u16> = self
            .file_name
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let end = units.iter().rposition(|&u| u != 0).map_or(0, |p| p + 1);
        String::from_utf16_lossy(&units[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{decode_body, verify_packet};

    #[test]
    fn test_unicode_name_roundtrip() {
        let set_id = RecoverySetId::new([4; 16]);
        let id = FileId::new([5; 16]);
        let packet = UnicodeFileNameBody::new(&id, "数据.bin").to_packet(&set_id).unwrap();

        assert!(verify_packet(&packet));
        // 6 code units -> 12 bytes, already aligned
        assert_eq!(packet.len(), 64 + 16 + 12);

        let (header, body) = decode_body::<UnicodeFileNameBody>(&packet).unwrap();
        assert_eq!(&header.type_of_packet, UNICODE_TYPE_OF_PACKET);
        assert_eq!(body.file_id, [5; 16]);
        assert_eq!(body.name(), "数据.bin");
    }

    #[test]
    fn test_description_layout() {
        let set_id = RecoverySetId::new([1; 16]);
        let body = FileDescriptionBody::new(
            &FileId::new([2; 16]),
            &Md5Hash::new([3; 16]),
            &Md5Hash::new([4; 16]),
            1234,
            b"ab\0\0".to_vec(),
        );
        let packet = body.to_packet(&set_id).unwrap();

        assert_eq!(packet.len(), 64 + 56 + 4);
        assert_eq!(&packet[64..80], &[2; 16]);
        assert_eq!(&packet[80..96], &[3; 16]);
        assert_eq!(&packet[96..112], &[4; 16]);
        assert_eq!(&packet[112..120], &1234u64.to_le_bytes());
        assert_eq!(&packet[120..124], b"ab\0\0");
    }
}
