//! Chunked recovery generation
//!
//! When the recovery slices don't fit in memory at once, [`Par2Chunked`]
//! computes them one byte range (chunk) at a time. Each pass streams the same
//! chunk window of every input slice, producing that window of every recovery
//! slice; the caller writes the chunk outputs out and moves to the next window.
//!
//! With a header template (see [`Par2::start_chunking`](crate::Par2::start_chunking))
//! the packet MD5 of every recovery slice is built as chunks are finalised, so
//! chunks must then be finalised in slice order.

use crate::config::DEFAULT_BATCH_SIZE;
use crate::domain::{GlobalSliceIndex, LocalSliceIndex};
use crate::engine::{AlignedBuffer, Gf16Engine, RecoveryEngine};
use crate::error::{Par2Error, Result};
use crate::file::Par2File;
use crate::packets::recovery_slice_packet::{finish_header, seed_packet_md5};
use crate::packets::{HEADER_SIZE, RECOVERY_HEADER_SIZE};
use crate::pipeline::BatchPipeline;
use log::debug;
use md5::{Digest, Md5};

/// Packet hash of one recovery slice as it is streamed
#[derive(Debug, Clone)]
pub enum ChunkDigest {
    /// Still folding in finalised chunks
    Accumulating(Md5),
    /// Closed by a header request; further chunks are an error
    Finalized([u8; 16]),
    /// Header handed over for good
    Consumed,
}

impl ChunkDigest {
    /// Close the digest if needed and return the hash
    fn close(&mut self) -> Option<[u8; 16]> {
        if let ChunkDigest::Accumulating(md5) = self {
            let hash: [u8; 16] = md5.clone().finalize().into();
            *self = ChunkDigest::Finalized(hash);
        }
        match self {
            ChunkDigest::Finalized(hash) => Some(*hash),
            _ => None,
        }
    }

    fn is_accumulating(&self) -> bool {
        matches!(self, ChunkDigest::Accumulating(_))
    }

    fn fold(&mut self, data: &[u8]) {
        if let ChunkDigest::Accumulating(md5) = self {
            md5.update(data);
        }
    }
}

/// Streams recovery data chunk by chunk
pub struct Par2Chunked<E: RecoveryEngine = Gf16Engine> {
    engine: E,
    exponents: Vec<u16>,
    outputs: Vec<AlignedBuffer>,
    chunk_size: usize,
    template: Option<[u8; HEADER_SIZE]>,
    digests: Vec<ChunkDigest>,
    /// Recovery bytes hashed so far, and the slice size they must reach
    folded: u64,
    slice_size: u64,
    unconsumed_headers: usize,
    pipeline: BatchPipeline,
}

impl Par2Chunked<Gf16Engine> {
    /// Streamer over `exponents` using the bundled engine
    pub fn new(exponents: &[u16], template: Option<[u8; HEADER_SIZE]>) -> Result<Self> {
        Self::with_engine(exponents, template, Gf16Engine::default(), DEFAULT_BATCH_SIZE)
    }
}

impl<E: RecoveryEngine> Par2Chunked<E> {
    pub fn with_engine(
        exponents: &[u16],
        template: Option<[u8; HEADER_SIZE]>,
        engine: E,
        batch_size: usize,
    ) -> Result<Self> {
        if exponents.is_empty() {
            return Err(Par2Error::NoRecoverySlices);
        }
        let slice_size = template.map_or(0, |template| {
            let mut length = [0u8; 8];
            length.copy_from_slice(&template[8..16]);
            u64::from_le_bytes(length).saturating_sub(RECOVERY_HEADER_SIZE as u64)
        });
        let digests = match &template {
            Some(template) => exponents
                .iter()
                .map(|&exponent| ChunkDigest::Accumulating(seed_packet_md5(template, exponent)))
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            engine,
            exponents: exponents.to_vec(),
            outputs: Vec::new(),
            chunk_size: 0,
            template,
            digests,
            folded: 0,
            slice_size,
            unconsumed_headers: exponents.len(),
            pipeline: BatchPipeline::new(batch_size),
        })
    }

    pub fn exponents(&self) -> &[u16] {
        &self.exponents
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resize the chunk window
    ///
    /// Reallocates every output buffer (zero releases them) and restarts
    /// batching, so any staged input is dropped.
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        if size % 2 != 0 {
            return Err(Par2Error::InvalidChunkSize(size));
        }
        self.chunk_size = size;
        self.outputs = if size == 0 {
            Vec::new()
        } else {
            self.exponents
                .iter()
                .map(|_| self.engine.alloc(size))
                .collect()
        };
        self.pipeline.reset();
        debug!(
            "Chunk size set to {} bytes for {} recovery slices",
            size,
            self.exponents.len()
        );
        Ok(())
    }

    /// Feed the current chunk of input slice `index`
    pub fn process(&mut self, index: GlobalSliceIndex, data: &[u8]) -> Result<()> {
        let Self {
            engine,
            exponents,
            outputs,
            chunk_size,
            pipeline,
            ..
        } = self;
        let mut views: Vec<&mut [u8]> = outputs.iter_mut().map(|b| b.as_mut_slice()).collect();
        pipeline.enqueue(&*engine, data, index, *chunk_size, &mut views, exponents)
    }

    /// Feed the current chunk of `file`'s next slice
    pub fn process_file(&mut self, file: &mut Par2File, data: &[u8]) -> Result<()> {
        if file.chunk_slice_pos >= file.num_slices() {
            return Err(Par2Error::TooManySlices {
                name: file.name().to_string(),
                num_slices: file.num_slices(),
            });
        }
        let index = LocalSliceIndex::new(file.chunk_slice_pos).to_global(file.slice_offset());
        file.chunk_slice_pos += 1;
        self.process(index, data)
    }

    /// Complete the current chunk pass
    ///
    /// Rewinds the chunk cursor of `files`, flushes the pipeline and folds the
    /// finished chunk of every recovery slice into its packet hash. Fails
    /// without hashing anything if a header was already generated.
    pub fn finalise(&mut self, files: &mut [Par2File]) -> Result<()> {
        for file in files.iter_mut() {
            file.chunk_slice_pos = 0;
        }

        let Self {
            engine,
            exponents,
            outputs,
            pipeline,
            digests,
            template,
            chunk_size,
            folded,
            ..
        } = self;
        {
            let mut views: Vec<&mut [u8]> = outputs.iter_mut().map(|b| b.as_mut_slice()).collect();
            pipeline.flush(&*engine, &mut views, exponents)?;
        }
        if template.is_some() && *chunk_size > 0 {
            if !digests.iter().all(ChunkDigest::is_accumulating) {
                return Err(Par2Error::HeaderAlreadyGenerated);
            }
            for (digest, output) in digests.iter_mut().zip(outputs.iter()) {
                digest.fold(output);
            }
            *folded += *chunk_size as u64;
        }
        Ok(())
    }

    /// 68-byte header of recovery slice `index`, keeping it available
    ///
    /// Closes the slice's packet hash; no further chunks can be finalised.
    /// The finalised chunks must cover the whole slice.
    pub fn header(&mut self, index: usize) -> Result<[u8; RECOVERY_HEADER_SIZE]> {
        let template = self.template.ok_or(Par2Error::NoHeaderTemplate)?;
        let count = self.exponents.len();
        let exponent = *self
            .exponents
            .get(index)
            .ok_or(Par2Error::RecoveryIndexOutOfRange { index, count })?;
        let digest = self
            .digests
            .get_mut(index)
            .ok_or(Par2Error::PacketConsumed("Recovery header"))?;
        if digest.is_accumulating() && self.folded != self.slice_size {
            return Err(Par2Error::RecoveryLengthMismatch {
                expected: self.slice_size,
                actual: self.folded,
            });
        }
        let hash = digest
            .close()
            .ok_or(Par2Error::PacketConsumed("Recovery header"))?;
        Ok(finish_header(&template, exponent, &hash))
    }

    /// 68-byte header of recovery slice `index`, which can't be requested again
    ///
    /// Once every header is taken the template and hashes are released.
    pub fn take_header(&mut self, index: usize) -> Result<[u8; RECOVERY_HEADER_SIZE]> {
        let header = self.header(index)?;
        self.digests[index] = ChunkDigest::Consumed;
        self.unconsumed_headers -= 1;
        if self.unconsumed_headers == 0 {
            debug!("All recovery headers consumed");
            self.template = None;
            self.digests = Vec::new();
        }
        Ok(header)
    }

    /// Current chunk of recovery slice `index`
    pub fn recovery_data(&self, index: usize) -> Result<&[u8]> {
        let count = self.outputs.len();
        self.outputs
            .get(index)
            .map(AlignedBuffer::as_slice)
            .ok_or(Par2Error::RecoveryIndexOutOfRange { index, count })
    }
}

impl<E: RecoveryEngine> std::fmt::Debug for Par2Chunked<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Par2Chunked")
            .field("exponents", &self.exponents)
            .field("chunk_size", &self.chunk_size)
            .field("folded", &self.folded)
            .field("has_template", &self.template.is_some())
            .field("unconsumed_headers", &self.unconsumed_headers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecoverySetId;
    use crate::packets::recovery_slice_packet::header_template;

    #[test]
    fn test_requires_recovery_slices() {
        assert!(matches!(Par2Chunked::new(&[], None), Err(Par2Error::NoRecoverySlices)));
    }

    #[test]
    fn test_odd_chunk_size_rejected() {
        let mut chunked = Par2Chunked::new(&[0], None).unwrap();
        assert!(matches!(chunked.set_chunk_size(7), Err(Par2Error::InvalidChunkSize(7))));
        chunked.set_chunk_size(0).unwrap();
        assert!(chunked.recovery_data(0).is_err());
    }

    #[test]
    fn test_header_needs_template() {
        let mut chunked = Par2Chunked::new(&[0, 1], None).unwrap();
        assert!(matches!(chunked.header(0), Err(Par2Error::NoHeaderTemplate)));
    }

    #[test]
    fn test_header_lifecycle() {
        let template = header_template(&RecoverySetId::new([6; 16]), 8);
        let mut chunked = Par2Chunked::new(&[3, 4], Some(template)).unwrap();
        chunked.set_chunk_size(4).unwrap();

        for _ in 0..2 {
            chunked.process(GlobalSliceIndex::new(0), &[1, 2, 3, 4]).unwrap();
            chunked.finalise(&mut []).unwrap();
        }

        let kept = chunked.header(0).unwrap();
        assert_eq!(chunked.header(0).unwrap(), kept);
        assert_eq!(&kept[64..68], &3u32.to_le_bytes());

        // Closed digest refuses more data
        chunked.process(GlobalSliceIndex::new(0), &[0; 4]).unwrap();
        assert!(matches!(
            chunked.finalise(&mut []),
            Err(Par2Error::HeaderAlreadyGenerated)
        ));

        assert_eq!(chunked.take_header(0).unwrap(), kept);
        assert!(matches!(chunked.header(0), Err(Par2Error::PacketConsumed(_))));
        assert!(matches!(
            chunked.header(2),
            Err(Par2Error::RecoveryIndexOutOfRange { index: 2, count: 2 })
        ));

        chunked.take_header(1).unwrap();
        assert!(matches!(chunked.header(1), Err(Par2Error::NoHeaderTemplate)));
    }

    #[test]
    fn test_header_before_whole_slice_folded() {
        let template = header_template(&RecoverySetId::new([2; 16]), 256);
        let mut chunked = Par2Chunked::new(&[0], Some(template)).unwrap();
        chunked.set_chunk_size(64).unwrap();
        chunked.process(GlobalSliceIndex::new(0), &[9; 64]).unwrap();
        chunked.finalise(&mut []).unwrap();

        assert!(matches!(
            chunked.take_header(0),
            Err(Par2Error::RecoveryLengthMismatch { expected: 256, actual: 64 })
        ));

        for _ in 0..3 {
            chunked.process(GlobalSliceIndex::new(0), &[9; 64]).unwrap();
            chunked.finalise(&mut []).unwrap();
        }
        assert!(chunked.take_header(0).is_ok());
    }

    #[test]
    fn test_rejected_chunk_leaves_open_digests_untouched() {
        let template = header_template(&RecoverySetId::new([4; 16]), 8);
        let run = |close_second: bool| {
            let mut chunked = Par2Chunked::new(&[0, 1], Some(template)).unwrap();
            chunked.set_chunk_size(4).unwrap();
            for chunk in [[1u8, 2, 3, 4], [5, 6, 7, 8]] {
                chunked.process(GlobalSliceIndex::new(0), &chunk).unwrap();
                chunked.finalise(&mut []).unwrap();
            }
            if close_second {
                chunked.header(1).unwrap();
                chunked.process(GlobalSliceIndex::new(0), &[0xff; 4]).unwrap();
                assert!(matches!(
                    chunked.finalise(&mut []),
                    Err(Par2Error::HeaderAlreadyGenerated)
                ));
            }
            chunked.header(0).unwrap()
        };

        assert_eq!(run(true), run(false));
    }
}
