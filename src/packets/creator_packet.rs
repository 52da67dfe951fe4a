use super::text::padded_ascii;
use super::build_packet;
use crate::domain::RecoverySetId;
use crate::error::Result;
use binrw::helpers::until_eof;
use binrw::{BinRead, BinWrite};

pub const TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0Creator\0";

/// Creator body: ASCII text identifying the client
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct CreatorBody {
    #[br(parse_with = until_eof)]
    pub creator_info: Vec<u8>,
}

impl CreatorBody {
    pub fn new(creator: &str) -> Self {
        Self {
            creator_info: padded_ascii(creator),
        }
    }

    pub fn to_packet(&self, set_id: &RecoverySetId) -> Result<Vec<u8>> {
        build_packet(self, set_id, TYPE_OF_PACKET)
    }
}
