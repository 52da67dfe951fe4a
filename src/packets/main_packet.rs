use super::{assemble_packet, serialize_body};
use crate::checksum::compute_recovery_set_id;
use crate::domain::{FileId, RecoverySetId};
use crate::error::Result;
use binrw::{BinRead, BinWrite};

pub const TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0Main\0\0\0\0";

/// Main packet body: slice size and the sorted recovery-set file IDs
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct MainPacketBody {
    pub slice_size: u64,
    pub file_count: u32,
    #[br(count = file_count)]
    pub file_ids: Vec<[u8; 16]>,
}

impl MainPacketBody {
    /// Body for `file_ids`, which must already be in ascending order
    pub fn new(slice_size: u64, file_ids: &[FileId]) -> Self {
        Self {
            slice_size,
            file_count: file_ids.len() as u32,
            file_ids: file_ids.iter().map(|id| *id.as_bytes()).collect(),
        }
    }

    /// Serialize, derive the set ID from the body and wrap it in a header
    pub fn into_packet(self) -> Result<(RecoverySetId, Vec<u8>)> {
        let body = serialize_body(&self)?;
        let set_id = compute_recovery_set_id(&body);
        let packet = assemble_packet(&body, &set_id, TYPE_OF_PACKET)?;
        Ok((set_id, packet))
    }
}
