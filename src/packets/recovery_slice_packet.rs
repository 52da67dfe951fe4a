//! Recovery slice packets
//!
//! The body is a little-endian u32 exponent followed by `slice_size` bytes of
//! recovery data. Because that data is produced by the coding engine in place,
//! the header is written into the 68 bytes directly in front of the recovery
//! buffer rather than through `binrw`; [`RecoverySliceBody`] exists to decode
//! finished packets.

use super::{HEADER_SIZE, MAGIC_BYTES};
use crate::checksum::new_md5_hasher;
use crate::domain::RecoverySetId;
use crate::error::{Par2Error, Result};
use binrw::helpers::until_eof;
use binrw::{BinRead, BinWrite};
use md5::{Digest, Md5};

pub const TYPE_OF_PACKET: &[u8; 16] = b"PAR 2.0\0RecvSlic";

/// Common header plus the exponent field
pub const RECOVERY_HEADER_SIZE: usize = HEADER_SIZE + 4;

/// Recovery slice body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct RecoverySliceBody {
    pub exponent: u32,
    #[br(parse_with = until_eof)]
    pub recovery_data: Vec<u8>,
}

/// Header of a recovery packet with the MD5 field left zero
pub fn header_template(set_id: &RecoverySetId, slice_size: u64) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..8].copy_from_slice(MAGIC_BYTES);
    header[8..16].copy_from_slice(&(slice_size + RECOVERY_HEADER_SIZE as u64).to_le_bytes());
    header[32..48].copy_from_slice(set_id.as_bytes());
    header[48..64].copy_from_slice(TYPE_OF_PACKET);
    header
}

/// Packet hash state after the set ID, type and exponent
///
/// Feeding the recovery data afterwards and finalising yields the packet MD5.
pub fn seed_packet_md5(template: &[u8; HEADER_SIZE], exponent: u16) -> Md5 {
    let mut md5 = new_md5_hasher();
    md5.update(&template[32..]);
    md5.update((exponent as u32).to_le_bytes());
    md5
}

/// Complete 68-byte header from a template, exponent and packet hash
pub fn finish_header(
    template: &[u8; HEADER_SIZE],
    exponent: u16,
    packet_md5: &[u8; 16],
) -> [u8; RECOVERY_HEADER_SIZE] {
    let mut header = [0u8; RECOVERY_HEADER_SIZE];
    header[..HEADER_SIZE].copy_from_slice(template);
    header[16..32].copy_from_slice(packet_md5);
    header[HEADER_SIZE..].copy_from_slice(&(exponent as u32).to_le_bytes());
    header
}

/// Build a recovery header from recovery data held in pieces
///
/// The pieces, in order, must add up to exactly `slice_size` bytes.
pub fn make_recovery_header(
    set_id: &RecoverySetId,
    slice_size: u64,
    chunks: &[&[u8]],
    exponent: u16,
) -> Result<[u8; RECOVERY_HEADER_SIZE]> {
    let template = header_template(set_id, slice_size);
    let mut md5 = seed_packet_md5(&template, exponent);

    let mut total = 0u64;
    for chunk in chunks {
        md5.update(chunk);
        total += chunk.len() as u64;
    }
    if total != slice_size {
        return Err(Par2Error::RecoveryLengthMismatch {
            expected: slice_size,
            actual: total,
        });
    }

    Ok(finish_header(&template, exponent, &md5.finalize().into()))
}
