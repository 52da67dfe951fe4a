//! PAR2 packet encoding
//!
//! Every packet starts with the same 64-byte header:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 8    | magic `PAR2\0PKT`                       |
//! | 8      | 8    | packet length, header included (LE u64) |
//! | 16     | 16   | MD5 of bytes 32..length                 |
//! | 32     | 16   | recovery set ID                         |
//! | 48     | 16   | packet type                             |
//!
//! Bodies are serialized with `binrw` into the space after the header, then
//! [`write_packet_header`] stamps the header and self-hash over them. The
//! `BinRead` side of each body type decodes emitted packets again.

use crate::checksum::compute_md5_bytes;
use crate::domain::RecoverySetId;
use crate::error::{Par2Error, Result};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

pub mod comment_packet;
pub mod creator_packet;
pub mod file_description_packet;
pub mod input_file_slice_checksum_packet;
pub mod main_packet;
pub mod recovery_slice_packet;
pub mod text;

pub use comment_packet::{CommentAsciiBody, CommentUnicodeBody};
pub use creator_packet::CreatorBody;
pub use file_description_packet::{FileDescriptionBody, UnicodeFileNameBody};
pub use input_file_slice_checksum_packet::{InputFileSliceChecksumBody, SliceChecksumEntry};
pub use main_packet::MainPacketBody;
pub use recovery_slice_packet::{RecoverySliceBody, RECOVERY_HEADER_SIZE};
pub use text::CharEncoding;

pub const MAGIC_BYTES: &[u8; 8] = b"PAR2\0PKT";

/// Size of the common packet header
pub const HEADER_SIZE: usize = 64;

/// Decoded common packet header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"PAR2\0PKT")]
pub struct PacketHeader {
    pub length: u64,
    pub md5: [u8; 16],
    pub set_id: [u8; 16],
    pub type_of_packet: [u8; 16],
}

/// Stamp the header of a packet whose body is already in place
///
/// `packet` must span exactly one packet: 64 header bytes followed by the
/// body. The body length has to be a multiple of 4.
pub fn write_packet_header(
    packet: &mut [u8],
    set_id: &RecoverySetId,
    type_of_packet: &[u8; 16],
) -> Result<()> {
    if packet.len() < HEADER_SIZE {
        return Err(Par2Error::UnalignedPacketLength(packet.len()));
    }
    let body_len = packet.len() - HEADER_SIZE;
    if body_len % 4 != 0 {
        return Err(Par2Error::UnalignedPacketLength(body_len));
    }

    let length = packet.len() as u64;
    packet[0..8].copy_from_slice(MAGIC_BYTES);
    packet[8..16].copy_from_slice(&length.to_le_bytes());
    packet[32..48].copy_from_slice(set_id.as_bytes());
    packet[48..64].copy_from_slice(type_of_packet);

    let hash = compute_md5_bytes(&packet[32..]);
    packet[16..32].copy_from_slice(&hash);
    Ok(())
}

/// Serialize a body into bytes
pub fn serialize_body<B>(body: &B) -> Result<Vec<u8>>
where
    B: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    body.write_options(&mut cursor, binrw::Endian::Little, ())?;
    Ok(cursor.into_inner())
}

/// Build a complete packet around an already-serialized body
pub fn assemble_packet(
    body: &[u8],
    set_id: &RecoverySetId,
    type_of_packet: &[u8; 16],
) -> Result<Vec<u8>> {
    let mut packet = vec![0u8; HEADER_SIZE + body.len()];
    packet[HEADER_SIZE..].copy_from_slice(body);
    write_packet_header(&mut packet, set_id, type_of_packet)?;
    Ok(packet)
}

/// Serialize `body` and wrap it in a header
pub fn build_packet<B>(body: &B, set_id: &RecoverySetId, type_of_packet: &[u8; 16]) -> Result<Vec<u8>>
where
    B: for<'a> BinWrite<Args<'a> = ()>,
{
    assemble_packet(&serialize_body(body)?, set_id, type_of_packet)
}

/// Check magic, length and self-hash of a single packet
pub fn verify_packet(packet: &[u8]) -> bool {
    match decode_header(packet) {
        Some(header) => {
            let length = header.length as usize;
            length <= packet.len() && compute_md5_bytes(&packet[32..length]) == header.md5
        }
        None => false,
    }
}

/// Decode the header of the packet at the start of `bytes`
pub fn decode_header(bytes: &[u8]) -> Option<PacketHeader> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let header = PacketHeader::read(&mut Cursor::new(&bytes[..HEADER_SIZE])).ok()?;
    let length = header.length;
    if length < HEADER_SIZE as u64 || length % 4 != 0 {
        return None;
    }
    Some(header)
}

/// Decode a packet's body as `B`
///
/// Returns `None` when the header is malformed or the body does not parse.
pub fn decode_body<B>(packet: &[u8]) -> Option<(PacketHeader, B)>
where
    B: for<'a> BinRead<Args<'a> = ()>,
{
    let header = decode_header(packet)?;
    let body = packet.get(HEADER_SIZE..header.length as usize)?;
    let parsed = B::read_options(&mut Cursor::new(body), binrw::Endian::Little, ()).ok()?;
    Some((header, parsed))
}

/// Split a buffer of back-to-back packets
///
/// Stops at the first malformed or truncated packet.
pub fn split_packets(mut bytes: &[u8]) -> Vec<&[u8]> {
    let mut packets = Vec::new();
    while let Some(header) = decode_header(bytes) {
        let length = header.length as usize;
        if length > bytes.len() {
            break;
        }
        let (packet, rest) = bytes.split_at(length);
        packets.push(packet);
        bytes = rest;
    }
    packets
}

/// Ownership state of an emitted packet
///
/// `Pending` packets have been built but never handed out, `Emitted` ones
/// have been lent to the caller at least once, and `Consumed` ones were
/// given away by value and can no longer be read.
#[derive(Debug, Clone)]
pub enum PacketSlot<T> {
    Pending(T),
    Emitted(T),
    Consumed,
}

impl<T> PacketSlot<T> {
    pub fn new(value: T) -> Self {
        PacketSlot::Pending(value)
    }

    /// Lend the value, keeping it in the slot
    pub fn emit(&mut self, kind: &'static str) -> Result<&T> {
        self.emit_mut(kind).map(|value| &*value)
    }

    /// Lend the value mutably, e.g. to refresh a header before handing it out
    pub fn emit_mut(&mut self, kind: &'static str) -> Result<&mut T> {
        if matches!(self, PacketSlot::Pending(_)) {
            if let PacketSlot::Pending(value) = std::mem::replace(self, PacketSlot::Consumed) {
                *self = PacketSlot::Emitted(value);
            }
        }
        match self {
            PacketSlot::Pending(value) | PacketSlot::Emitted(value) => Ok(value),
            PacketSlot::Consumed => Err(Par2Error::PacketConsumed(kind)),
        }
    }

    /// Mutable access without changing state
    pub fn get_mut(&mut self, kind: &'static str) -> Result<&mut T> {
        match self {
            PacketSlot::Pending(value) | PacketSlot::Emitted(value) => Ok(value),
            PacketSlot::Consumed => Err(Par2Error::PacketConsumed(kind)),
        }
    }

    /// Hand the value over, leaving the slot consumed
    pub fn take(&mut self, kind: &'static str) -> Result<T> {
        match std::mem::replace(self, PacketSlot::Consumed) {
            PacketSlot::Pending(value) | PacketSlot::Emitted(value) => Ok(value),
            PacketSlot::Consumed => Err(Par2Error::PacketConsumed(kind)),
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, PacketSlot::Consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TYPE: &[u8; 16] = b"PAR 2.0\0Test\0\0\0\0";

    #[test]
    fn test_header_layout() {
        let set_id = RecoverySetId::new([7; 16]);
        let packet = assemble_packet(&[1, 2, 3, 4], &set_id, TEST_TYPE).unwrap();

        assert_eq!(packet.len(), 68);
        assert_eq!(&packet[0..8], MAGIC_BYTES);
        assert_eq!(u64::from_le_bytes(packet[8..16].try_into().unwrap()), 68);
        assert_eq!(&packet[32..48], &[7; 16]);
        assert_eq!(&packet[48..64], TEST_TYPE);
        assert_eq!(&packet[16..32], &compute_md5_bytes(&packet[32..]));
        assert!(verify_packet(&packet));
    }

    #[test]
    fn test_unaligned_body_rejected() {
        let set_id = RecoverySetId::default();
        let result = assemble_packet(&[1, 2, 3], &set_id, TEST_TYPE);
        assert!(matches!(result, Err(Par2Error::UnalignedPacketLength(3))));
    }

    #[test]
    fn test_verify_detects_corruption() {
        let set_id = RecoverySetId::new([1; 16]);
        let mut packet = assemble_packet(&[0; 8], &set_id, TEST_TYPE).unwrap();
        packet[70] ^= 1;
        assert!(!verify_packet(&packet));
    }

    #[test]
    fn test_split_packets() {
        let set_id = RecoverySetId::new([2; 16]);
        let mut bytes = assemble_packet(&[0; 4], &set_id, TEST_TYPE).unwrap();
        bytes.extend(assemble_packet(&[0; 12], &set_id, TEST_TYPE).unwrap());
        bytes.extend_from_slice(b"trailing junk");

        let packets = split_packets(&bytes);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].len(), 68);
        assert_eq!(packets[1].len(), 76);
    }

    #[test]
    fn test_header_decodes() {
        let set_id = RecoverySetId::new([3; 16]);
        let packet = assemble_packet(&[0; 4], &set_id, TEST_TYPE).unwrap();
        let header = decode_header(&packet).unwrap();
        assert_eq!(header.length, 68);
        assert_eq!(header.set_id, [3; 16]);
        assert_eq!(&header.type_of_packet, TEST_TYPE);
    }

    #[test]
    fn test_packet_slot_transitions() {
        let mut slot = PacketSlot::new(5u32);
        assert!(matches!(slot, PacketSlot::Pending(5)));

        assert_eq!(*slot.emit("Test").unwrap(), 5);
        assert!(matches!(slot, PacketSlot::Emitted(5)));

        assert_eq!(slot.take("Test").unwrap(), 5);
        assert!(slot.is_consumed());
        assert!(matches!(slot.emit("Test"), Err(Par2Error::PacketConsumed("Test"))));
        assert!(slot.take("Test").is_err());
    }
}
