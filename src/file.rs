//! Per-file identity and slice accounting
//!
//! A [`Par2File`] is created by [`Par2::new`](crate::Par2::new) for every input
//! file. The caller takes the file list from the container and streams each
//! file's slices through [`Par2File::process`], which records the slice
//! checksums, folds the data into the whole-file MD5 and forwards the slice to
//! the container's recovery pipeline.

use crate::checksum::{
    calculate_file_md5_16k, compute_file_id, compute_slice_checksums, finalize_md5,
    new_md5_hasher,
};
use crate::domain::{FileId, GlobalSliceIndex, LocalSliceIndex, Md5Hash, RecoverySetId};
use crate::engine::RecoveryEngine;
use crate::error::{Par2Error, Result};
use crate::packets::text::{ascii_bytes, padded_ascii, CharEncoding};
use crate::packets::{
    FileDescriptionBody, InputFileSliceChecksumBody, PacketSlot, SliceChecksumEntry,
    UnicodeFileNameBody,
};
use crate::par2::Par2;
use log::{debug, trace};
use md5::{Digest, Md5};
use std::path::Path;

/// Metadata needed to place a file in a recovery set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// MD5 of the first 16 KiB (whole file if shorter)
    pub md5_16k: Md5Hash,
    /// Whole-file MD5 when already known; otherwise built while streaming
    pub md5: Option<Md5Hash>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, md5_16k: Md5Hash) -> Self {
        Self {
            name: name.into(),
            size,
            md5_16k,
            md5: None,
        }
    }

    pub fn with_md5(mut self, md5: Md5Hash) -> Self {
        self.md5 = Some(md5);
        self
    }

    /// Stat a file on disk and hash its first 16 KiB
    ///
    /// The name is the final path component.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let md5_16k = calculate_file_md5_16k(path)?;
        debug!(
            "File info for {}: {} bytes, 16k MD5 {}",
            name,
            metadata.len(),
            md5_16k
        );
        Ok(Self::new(name, metadata.len(), md5_16k))
    }
}

/// Number of slices a file of `size` bytes occupies
///
/// Empty files still take one (all-padding) slice.
pub fn slice_count(size: u64, slice_size: u64) -> u64 {
    size.div_ceil(slice_size).max(1)
}

/// A file within a recovery set
#[derive(Debug)]
pub struct Par2File {
    id: FileId,
    set_id: RecoverySetId,
    name: String,
    size: u64,
    md5_16k: Md5Hash,
    md5: Option<Md5Hash>,
    md5_ctx: Option<Md5>,
    slice_size: u64,
    num_slices: u32,
    slice_offset: GlobalSliceIndex,
    slice_pos: u32,
    pub(crate) chunk_slice_pos: u32,
    checksums: PacketSlot<Vec<SliceChecksumEntry>>,
}

impl Par2File {
    /// File with its identity computed; set ID and offset are assigned later
    pub(crate) fn new(info: FileInfo, slice_size: u64) -> Result<Self> {
        let num_slices = slice_count(info.size, slice_size);
        let num_slices = u32::try_from(num_slices).map_err(|_| {
            Par2Error::TooLarge(format!("{} needs {} slices", info.name, num_slices))
        })?;
        let id = compute_file_id(&info.md5_16k, info.size, &ascii_bytes(&info.name));
        let md5_ctx = match info.md5 {
            Some(_) => None,
            None => Some(new_md5_hasher()),
        };

        Ok(Self {
            id,
            set_id: RecoverySetId::default(),
            name: info.name,
            size: info.size,
            md5_16k: info.md5_16k,
            md5: info.md5,
            md5_ctx,
            slice_size,
            num_slices,
            slice_offset: GlobalSliceIndex::default(),
            slice_pos: 0,
            chunk_slice_pos: 0,
            checksums: PacketSlot::new(vec![SliceChecksumEntry::default(); num_slices as usize]),
        })
    }

    pub(crate) fn assign(&mut self, set_id: RecoverySetId, slice_offset: GlobalSliceIndex) {
        self.set_id = set_id;
        self.slice_offset = slice_offset;
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn md5_16k(&self) -> &Md5Hash {
        &self.md5_16k
    }

    /// Whole-file MD5, once supplied or sealed by the final slice
    pub fn md5(&self) -> Option<&Md5Hash> {
        self.md5.as_ref()
    }

    pub fn num_slices(&self) -> u32 {
        self.num_slices
    }

    /// Global index of this file's first slice
    pub fn slice_offset(&self) -> GlobalSliceIndex {
        self.slice_offset
    }

    /// Slices processed so far
    pub fn slice_pos(&self) -> u32 {
        self.slice_pos
    }

    /// Next slice consumed by [`crate::Par2Chunked::process_file`]
    pub fn chunk_slice_pos(&self) -> u32 {
        self.chunk_slice_pos
    }

    /// Expected length of slice `pos`
    pub fn slice_len(&self, pos: u32) -> usize {
        if pos + 1 < self.num_slices {
            self.slice_size as usize
        } else {
            (self.size - (self.num_slices as u64 - 1) * self.slice_size) as usize
        }
    }

    /// Stream the next slice of this file
    ///
    /// Slices must arrive in order; every one but the last is exactly
    /// `slice_size` bytes long. The slice is handed to `par2` before this
    /// file records it, so a slice the container refuses leaves the file
    /// unchanged and can be sent again. An engine failure while a batch is
    /// issued leaves the recovery data unusable.
    pub fn process<E: RecoveryEngine>(&mut self, data: &[u8], par2: &mut Par2<E>) -> Result<()> {
        if self.slice_pos >= self.num_slices {
            return Err(Par2Error::TooManySlices {
                name: self.name.clone(),
                num_slices: self.num_slices,
            });
        }
        let expected = self.slice_len(self.slice_pos);
        if data.len() != expected {
            return Err(Par2Error::InvalidDataLength {
                name: self.name.clone(),
                slice: self.slice_pos,
                expected,
                actual: data.len(),
            });
        }

        if self.checksums.is_consumed() {
            return Err(Par2Error::PacketConsumed("IFSC"));
        }
        let index = LocalSliceIndex::new(self.slice_pos).to_global(self.slice_offset);
        par2.process_slice(data, index)?;

        let (md5, crc32) = compute_slice_checksums(data, self.slice_size as usize);
        self.checksums.get_mut("IFSC")?[self.slice_pos as usize] = SliceChecksumEntry::new(md5, crc32);
        trace!(
            "{} slice {}: md5 {} crc32 {}",
            self.name,
            self.slice_pos,
            md5,
            crc32
        );

        let last = self.slice_pos + 1 == self.num_slices;
        if let Some(ctx) = self.md5_ctx.as_mut() {
            ctx.update(data);
        }
        if last {
            if let Some(ctx) = self.md5_ctx.take() {
                let md5 = finalize_md5(ctx);
                debug!("{} complete, MD5 {}", self.name, md5);
                self.md5 = Some(md5);
            }
        }

        self.slice_pos += 1;
        Ok(())
    }

    /// IFSC packet, keeping the checksum table
    pub fn packet_checksums(&mut self) -> Result<Vec<u8>> {
        let entries = self.checksums.emit("IFSC")?.clone();
        InputFileSliceChecksumBody::new(&self.id, entries).to_packet(&self.set_id)
    }

    /// IFSC packet, releasing the checksum table
    pub fn take_packet_checksums(&mut self) -> Result<Vec<u8>> {
        let entries = self.checksums.take("IFSC")?;
        InputFileSliceChecksumBody::new(&self.id, entries).to_packet(&self.set_id)
    }

    /// FileDesc packet, followed by a UniFileN packet when `encoding` asks for one
    ///
    /// `Unicode` on its own is rejected: the FileDesc packet is mandatory.
    pub fn make_packet_description(&self, encoding: CharEncoding) -> Result<Vec<u8>> {
        let encoding = encoding.resolve(&self.name);
        if encoding == CharEncoding::Unicode {
            return Err(Par2Error::UnknownEncoding(format!("{:?}", encoding)));
        }
        let md5 = self
            .md5
            .ok_or_else(|| Par2Error::FileMd5Unavailable(self.name.clone()))?;

        let mut packet = FileDescriptionBody::new(
            &self.id,
            &md5,
            &self.md5_16k,
            self.size,
            padded_ascii(&self.name),
        )
        .to_packet(&self.set_id)?;
        if encoding.includes_unicode() {
            packet.extend(self.make_packet_unicode_name()?);
        }
        Ok(packet)
    }

    /// UniFileN packet on its own
    pub fn make_packet_unicode_name(&self) -> Result<Vec<u8>> {
        UnicodeFileNameBody::new(&self.id, &self.name).to_packet(&self.set_id)
    }
}
