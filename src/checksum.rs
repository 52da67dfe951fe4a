//! Hashing helpers shared by the packet builders and slice accounting
//!
//! Every MD5 and CRC32 in the crate is computed here so the padding and
//! byte-order rules live in one place.
//!
//! ## Zero padding
//!
//! PAR2 checksums every slice as if it were exactly `slice_size` bytes long;
//! a short final slice is hashed as `data || zeros`. Rather than allocating a
//! padded copy, the padding is fed from [`ZERO_BUFFER`], a process-wide
//! read-only block of zeros, in fixed-size increments.

use crate::domain::{Crc32Value, FileId, Md5Hash, RecoverySetId};
use md5::{Digest, Md5};
use std::io::Read;
use std::path::Path;

/// Bytes of each file covered by the 16k MD5
pub const HASH_16K_THRESHOLD: usize = 16384;

const ZERO_BUFFER_LEN: usize = 8192;

/// Shared zero-fill source for checksum padding
pub static ZERO_BUFFER: [u8; ZERO_BUFFER_LEN] = [0u8; ZERO_BUFFER_LEN];

#[inline]
pub fn compute_md5(data: &[u8]) -> Md5Hash {
    Md5Hash::new(compute_md5_bytes(data))
}

/// Raw digest, for packet self-hashes
#[inline]
pub fn compute_md5_bytes(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// Fresh incremental MD5 state
#[inline]
pub fn new_md5_hasher() -> Md5 {
    Md5::new()
}

#[inline]
pub fn finalize_md5(hasher: Md5) -> Md5Hash {
    Md5Hash::new(hasher.finalize().into())
}

/// IEEE CRC32, the variant PAR2 stores per slice
#[inline]
pub fn compute_crc32(data: &[u8]) -> Crc32Value {
    Crc32Value::new(crc32fast::hash(data))
}

/// Feed `len` zero bytes into both hashers
fn update_with_zeros(md5: &mut Md5, crc: &mut crc32fast::Hasher, mut len: usize) {
    while len > 0 {
        let step = len.min(ZERO_BUFFER_LEN);
        md5.update(&ZERO_BUFFER[..step]);
        crc.update(&ZERO_BUFFER[..step]);
        len -= step;
    }
}

/// MD5 and CRC32 of `data` zero-padded to `slice_size`
///
/// `data` longer than `slice_size` is hashed as-is; callers validate lengths
/// before getting here.
pub fn compute_slice_checksums(data: &[u8], slice_size: usize) -> (Md5Hash, Crc32Value) {
    let mut md5 = new_md5_hasher();
    let mut crc = crc32fast::Hasher::new();
    md5.update(data);
    crc.update(data);
    update_with_zeros(&mut md5, &mut crc, slice_size.saturating_sub(data.len()));
    (finalize_md5(md5), Crc32Value::new(crc.finalize()))
}

/// File ID: MD5 over the 16k hash, the LE length and the 8-bit name
pub fn compute_file_id(md5_16k: &Md5Hash, length: u64, name: &[u8]) -> FileId {
    let mut md5 = new_md5_hasher();
    md5.update(md5_16k.as_bytes());
    md5.update(length.to_le_bytes());
    md5.update(name);
    FileId::new(md5.finalize().into())
}

/// Recovery set ID: MD5 of the serialized Main packet body
pub fn compute_recovery_set_id(main_body: &[u8]) -> RecoverySetId {
    RecoverySetId::new(compute_md5_bytes(main_body))
}

/// MD5 of the first 16 KiB of a file (the whole file if shorter)
pub fn calculate_file_md5_16k(path: &Path) -> std::io::Result<Md5Hash> {
    let mut prefix = Vec::with_capacity(HASH_16K_THRESHOLD);
    std::fs::File::open(path)?
        .take(HASH_16K_THRESHOLD as u64)
        .read_to_end(&mut prefix)?;
    Ok(compute_md5(&prefix))
}
