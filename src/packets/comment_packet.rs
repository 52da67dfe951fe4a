use super::text::{padded_ascii, padded_utf16};
use super::build_packet;
use crate::domain::RecoverySetId;
use crate::error::Result;
use binrw::helpers::until_eof;
use binrw::{BinRead, BinWrite};

pub const ASCII_TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0CommASCI";

/// Unicode comment packet type
///
/// The PAR2 format only names a 15 character identifier here; it is
/// padded with a NUL like every other client does.
pub const UNICODE_TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0CommUni\0";

/// ASCII comment body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct CommentAsciiBody {
    #[br(parse_with = until_eof)]
    pub comment: Vec<u8>,
}

impl CommentAsciiBody {
    pub fn new(comment: &str) -> Self {
        Self {
            comment: padded_ascii(comment),
        }
    }

    pub fn to_packet(&self, set_id: &RecoverySetId) -> Result<Vec<u8>> {
        build_packet(self, set_id, ASCII_TYPE_OF_PACKET)
    }
}

/// Unicode comment body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct CommentUnicodeBody {
    /// Self-hash of the matching ASCII comment packet, or zeros
    pub ascii_md5: [u8; 16],
    #[br(parse_with = until_eof)]
    pub comment: Vec<u8>,
}

impl CommentUnicodeBody {
    pub fn new(comment: &str, ascii_md5: Option<[u8; 16]>) -> Self {
        Self {
            ascii_md5: ascii_md5.unwrap_or_default(),
            comment: padded_utf16(comment),
        }
    }

    pub fn to_packet(&self, set_id: &RecoverySetId) -> Result<Vec<u8>> {
        build_packet(self, set_id, UNICODE_TYPE_OF_PACKET)
    }
}
