//! Recovery set container
//!
//! [`Par2`] owns everything that is shared across a recovery set: the slice
//! size, the sorted file list, the Main packet (and the set ID derived from
//! it), the chosen recovery exponents and their output buffers.
//!
//! ## Recovery buffers
//!
//! Each recovery slice lives in a single aligned allocation with room for the
//! 68-byte packet header in front of the data:
//!
//! ```text
//! | pad | header (68) | recovery data (slice_size) |
//!       ^             ^
//!       |             header_room (aligned)
//!       header_room - 68
//! ```
//!
//! The coding engine writes into the aligned data view, and the finished
//! packet is handed out as one contiguous slice without copying.

use crate::chunked::Par2Chunked;
use crate::config::Par2Options;
use crate::domain::{GlobalSliceIndex, RecoverySetId};
use crate::engine::{AlignedBuffer, Gf16Engine, RecoveryEngine, MAX_INPUT_SLICES};
use crate::error::{Par2Error, Result};
use crate::file::{FileInfo, Par2File};
use crate::packets::recovery_slice_packet::{self, header_template};
use crate::packets::text::CharEncoding;
use crate::packets::{
    write_packet_header, CommentAsciiBody, CommentUnicodeBody, CreatorBody, MainPacketBody,
    PacketSlot, HEADER_SIZE, RECOVERY_HEADER_SIZE,
};
use crate::pipeline::BatchPipeline;
use log::{debug, info};
use std::ops::Deref;

/// Bytes reserved ahead of each recovery buffer's data for its header
pub fn header_room(alignment: usize) -> usize {
    let alignment = alignment.max(1);
    RECOVERY_HEADER_SIZE.div_ceil(alignment) * alignment
}

/// Recovery packet taken out of a [`Par2`]
///
/// Wraps the aligned allocation the packet was built in and dereferences to
/// the packet bytes.
#[derive(Debug, Clone)]
pub struct RecoveryPacket {
    buffer: AlignedBuffer,
    start: usize,
}

impl RecoveryPacket {
    pub fn exponent(&self) -> u16 {
        let field = &self.buffer[self.start + HEADER_SIZE..self.start + RECOVERY_HEADER_SIZE];
        u32::from_le_bytes([field[0], field[1], field[2], field[3]]) as u16
    }

    /// Recovery data without the header
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.start + RECOVERY_HEADER_SIZE..]
    }
}

impl Deref for RecoveryPacket {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer[self.start..]
    }
}

impl AsRef<[u8]> for RecoveryPacket {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

#[derive(Debug)]
struct RecoverySlot {
    exponent: u16,
    buffer: PacketSlot<AlignedBuffer>,
}

/// A PAR2 recovery set being built
pub struct Par2<E: RecoveryEngine = Gf16Engine> {
    engine: E,
    slice_size: u64,
    set_id: RecoverySetId,
    total_slices: u32,
    files: Option<Vec<Par2File>>,
    main_packet: PacketSlot<Vec<u8>>,
    recovery: Vec<RecoverySlot>,
    header_room: usize,
    pipeline: BatchPipeline,
}

impl Par2<Gf16Engine> {
    /// Recovery set over `files` using the bundled engine and default options
    pub fn new(files: Vec<FileInfo>, slice_size: u64) -> Result<Self> {
        let options = Par2Options::default();
        Self::with_options(files, slice_size, Gf16Engine::new(options.alignment), options)
    }
}

impl<E: RecoveryEngine> Par2<E> {
    pub fn with_options(
        files: Vec<FileInfo>,
        slice_size: u64,
        engine: E,
        options: Par2Options,
    ) -> Result<Self> {
        if slice_size == 0 || slice_size % 4 != 0 || usize::try_from(slice_size).is_err() {
            return Err(Par2Error::InvalidSliceSize(slice_size));
        }

        let mut files = files
            .into_iter()
            .map(|info| Par2File::new(info, slice_size))
            .collect::<Result<Vec<_>>>()?;
        files.sort_by(|a, b| a.id().cmp(b.id()));

        let ids: Vec<_> = files.iter().map(|f| *f.id()).collect();
        let (set_id, main_packet) = MainPacketBody::new(slice_size, &ids).into_packet()?;

        let mut offset = 0u64;
        for file in &mut files {
            file.assign(set_id, GlobalSliceIndex::new(offset as u32));
            offset += file.num_slices() as u64;
        }
        if offset > MAX_INPUT_SLICES as u64 {
            return Err(Par2Error::TooLarge(format!(
                "{} input slices (maximum {})",
                offset, MAX_INPUT_SLICES
            )));
        }

        info!(
            "Recovery set {}: {} files, {} input slices of {} bytes",
            set_id,
            files.len(),
            offset,
            slice_size
        );

        let header_room = header_room(engine.alignment());
        Ok(Self {
            engine,
            slice_size,
            set_id,
            total_slices: offset as u32,
            files: Some(files),
            main_packet: PacketSlot::new(main_packet),
            recovery: Vec::new(),
            header_room,
            pipeline: BatchPipeline::new(options.effective_batch_size()),
        })
    }

    pub fn set_id(&self) -> &RecoverySetId {
        &self.set_id
    }

    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    /// Input slices across every file
    pub fn total_slices(&self) -> u32 {
        self.total_slices
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Exponents of the configured recovery slices, in output order
    pub fn recovery_exponents(&self) -> Vec<u16> {
        self.recovery.iter().map(|slot| slot.exponent).collect()
    }

    /// Files in ID order, still owned by the container
    pub fn files(&self) -> Result<&[Par2File]> {
        self.files.as_deref().ok_or(Par2Error::FilesConsumed)
    }

    /// Hand the files to the caller, who streams data through them
    pub fn take_files(&mut self) -> Result<Vec<Par2File>> {
        self.files.take().ok_or(Par2Error::FilesConsumed)
    }

    /// Choose which recovery slices to generate
    ///
    /// Any previous recovery data is discarded. An empty set releases all
    /// recovery state and makes streaming checksum-only.
    pub fn set_recovery_slices(&mut self, exponents: &[u16]) {
        self.pipeline.reset();
        let buffer_len = self.header_room + self.slice_size as usize;
        self.recovery = exponents
            .iter()
            .map(|&exponent| RecoverySlot {
                exponent,
                buffer: PacketSlot::new(self.engine.alloc(buffer_len)),
            })
            .collect();
        debug!(
            "Configured {} recovery slices ({} bytes each)",
            self.recovery.len(),
            buffer_len
        );
    }

    /// Generate recovery slices with exponents `0..count`
    pub fn set_recovery_count(&mut self, count: u16) {
        let exponents: Vec<u16> = (0..count).collect();
        self.set_recovery_slices(&exponents);
    }

    /// Feed one input slice to the recovery pipeline
    ///
    /// Usually called through [`Par2File::process`]. Does nothing when no
    /// recovery slices are configured.
    pub fn process_slice(&mut self, data: &[u8], index: GlobalSliceIndex) -> Result<()> {
        if self.recovery.is_empty() {
            return Ok(());
        }
        let Self {
            engine,
            pipeline,
            recovery,
            header_room,
            slice_size,
            ..
        } = self;
        let (mut outputs, exponents) = output_views(recovery, *header_room)?;
        pipeline.enqueue(&*engine, data, index, *slice_size as usize, &mut outputs, &exponents)
    }

    /// Flush the pipeline and finalise every recovery buffer
    pub fn finalise(&mut self) -> Result<()> {
        if self.recovery.is_empty() {
            return Ok(());
        }
        let Self {
            engine,
            pipeline,
            recovery,
            header_room,
            ..
        } = self;
        let (mut outputs, exponents) = output_views(recovery, *header_room)?;
        pipeline.flush(&*engine, &mut outputs, &exponents)?;
        pipeline.reset();
        debug!("Finalised {} recovery slices", recovery.len());
        Ok(())
    }

    /// Main packet, keeping it for later calls
    pub fn packet_main(&mut self) -> Result<&[u8]> {
        self.main_packet.emit("Main").map(Vec::as_slice)
    }

    /// Main packet, handed over by value
    pub fn take_packet_main(&mut self) -> Result<Vec<u8>> {
        self.main_packet.take("Main")
    }

    /// Recovery packet number `index`, header written over the current data
    pub fn packet_recovery(&mut self, index: usize) -> Result<&[u8]> {
        let start = self.header_room - RECOVERY_HEADER_SIZE;
        self.write_recovery_header(index)?;
        let buffer = self.recovery_slot(index)?.buffer.emit("Recovery")?;
        Ok(&buffer[start..])
    }

    /// Recovery packet number `index`, releasing its buffer to the caller
    pub fn take_packet_recovery(&mut self, index: usize) -> Result<RecoveryPacket> {
        self.write_recovery_header(index)?;
        let buffer = self.recovery_slot(index)?.buffer.take("Recovery")?;
        Ok(RecoveryPacket {
            buffer,
            start: self.header_room - RECOVERY_HEADER_SIZE,
        })
    }

    /// Creator packet naming the client that built the set
    pub fn make_packet_creator(&self, creator: &str) -> Result<Vec<u8>> {
        CreatorBody::new(creator).to_packet(&self.set_id)
    }

    /// CommASCI and/or CommUni packets, concatenated
    ///
    /// With both, the Unicode packet links to the ASCII packet's hash.
    pub fn make_packet_comment(&self, comment: &str, encoding: CharEncoding) -> Result<Vec<u8>> {
        let encoding = encoding.resolve(comment);
        let mut packets = Vec::new();
        let mut ascii_md5 = None;

        if encoding.includes_ascii() {
            let ascii = CommentAsciiBody::new(comment).to_packet(&self.set_id)?;
            let mut link = [0u8; 16];
            link.copy_from_slice(&ascii[16..32]);
            ascii_md5 = Some(link);
            packets.extend(ascii);
        }
        if encoding.includes_unicode() {
            packets.extend(CommentUnicodeBody::new(comment, ascii_md5).to_packet(&self.set_id)?);
        }
        Ok(packets)
    }

    /// 68-byte recovery header for data held in pieces (e.g. chunk outputs)
    pub fn make_recovery_header(
        &self,
        chunks: &[&[u8]],
        exponent: u16,
    ) -> Result<[u8; RECOVERY_HEADER_SIZE]> {
        recovery_slice_packet::make_recovery_header(&self.set_id, self.slice_size, chunks, exponent)
    }

    /// Bytes taken by `count` recovery packets
    pub fn recovery_size(&self, count: u64) -> u64 {
        (self.slice_size + RECOVERY_HEADER_SIZE as u64) * count
    }

    /// Chunked streamer for `exponents` using this set's recovery header
    ///
    /// Pass `sequential = false` when the chunks of a recovery slice will not
    /// be produced in order; headers then have to be built with
    /// [`make_recovery_header`](Self::make_recovery_header).
    pub fn start_chunking(&self, exponents: &[u16], sequential: bool) -> Result<Par2Chunked<E>>
    where
        E: Clone,
    {
        let template = sequential.then(|| header_template(&self.set_id, self.slice_size));
        Par2Chunked::with_engine(
            exponents,
            template,
            self.engine.clone(),
            self.pipeline.capacity(),
        )
    }

    fn recovery_slot(&mut self, index: usize) -> Result<&mut RecoverySlot> {
        let count = self.recovery.len();
        self.recovery
            .get_mut(index)
            .ok_or(Par2Error::RecoveryIndexOutOfRange { index, count })
    }

    fn write_recovery_header(&mut self, index: usize) -> Result<()> {
        let set_id = self.set_id;
        let start = self.header_room - RECOVERY_HEADER_SIZE;
        let slot = self.recovery_slot(index)?;
        let exponent = slot.exponent;
        let buffer = slot.buffer.get_mut("Recovery")?;
        let packet = &mut buffer[start..];
        packet[HEADER_SIZE..RECOVERY_HEADER_SIZE].copy_from_slice(&(exponent as u32).to_le_bytes());
        write_packet_header(packet, &set_id, recovery_slice_packet::TYPE_OF_PACKET)
    }
}

/// Data views of every recovery buffer, plus their exponents
fn output_views(recovery: &mut [RecoverySlot], header_room: usize) -> Result<(Vec<&mut [u8]>, Vec<u16>)> {
    let exponents = recovery.iter().map(|slot| slot.exponent).collect();
    let outputs = recovery
        .iter_mut()
        .map(|slot| {
            slot.buffer
                .get_mut("Recovery")
                .map(|buffer| &mut buffer[header_room..])
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((outputs, exponents))
}

impl<E: RecoveryEngine> std::fmt::Debug for Par2<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Par2")
            .field("set_id", &self.set_id)
            .field("slice_size", &self.slice_size)
            .field("total_slices", &self.total_slices)
            .field("recovery_slices", &self.recovery.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::compute_md5;
    use crate::packets::{decode_body, split_packets, verify_packet, CommentUnicodeBody};

    fn par2(sizes: &[u64], slice_size: u64) -> Par2 {
        let files = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let name = format!("file{}", i);
                FileInfo::new(name.clone(), size, compute_md5(name.as_bytes()))
            })
            .collect();
        Par2::new(files, slice_size).unwrap()
    }

    #[test]
    fn test_header_room() {
        assert_eq!(header_room(64), 128);
        assert_eq!(header_room(32), 96);
        assert_eq!(header_room(4), 68);
        assert_eq!(header_room(1), 68);
    }

    #[test]
    fn test_invalid_slice_size() {
        assert!(matches!(
            Par2::new(vec![], 1001),
            Err(Par2Error::InvalidSliceSize(1001))
        ));
        assert!(matches!(Par2::new(vec![], 0), Err(Par2Error::InvalidSliceSize(0))));
    }

    #[test]
    fn test_slice_offsets_follow_id_order() {
        let mut par2 = par2(&[10, 5000, 0], 4096);
        let files = par2.take_files().unwrap();
        let mut expected = 0;
        for pair in files.windows(2) {
            assert!(pair[0].id() < pair[1].id());
        }
        for file in &files {
            assert_eq!(file.slice_offset().as_u32(), expected);
            expected += file.num_slices();
        }
        assert_eq!(par2.total_slices(), 4);
        assert!(matches!(par2.take_files(), Err(Par2Error::FilesConsumed)));
        assert!(par2.files().is_err());
    }

    #[test]
    fn test_main_packet_slot() {
        let mut par2 = par2(&[10], 4096);
        let borrowed = par2.packet_main().unwrap().to_vec();
        assert!(verify_packet(&borrowed));
        assert_eq!(par2.take_packet_main().unwrap(), borrowed);
        assert!(matches!(par2.packet_main(), Err(Par2Error::PacketConsumed("Main"))));
    }

    #[test]
    fn test_recovery_packet_layout() {
        let mut par2 = par2(&[100], 64);
        par2.set_recovery_slices(&[0, 9]);
        let mut files = par2.take_files().unwrap();
        files[0].process(&[0x5A; 64], &mut par2).unwrap();
        files[0].process(&[0xA5; 36], &mut par2).unwrap();
        par2.finalise().unwrap();

        let packet = par2.packet_recovery(1).unwrap().to_vec();
        assert_eq!(packet.len(), 64 + 68);
        assert!(verify_packet(&packet));
        let (header, body) = decode_body::<recovery_slice_packet::RecoverySliceBody>(&packet).unwrap();
        assert_eq!(header.set_id, *par2.set_id().as_bytes());
        assert_eq!(body.exponent, 9);

        let taken = par2.take_packet_recovery(1).unwrap();
        assert_eq!(&*taken, packet.as_slice());
        assert_eq!(taken.exponent(), 9);
        assert_eq!(taken.data(), body.recovery_data.as_slice());
        assert!(par2.packet_recovery(1).is_err());
        assert!(matches!(
            par2.packet_recovery(2),
            Err(Par2Error::RecoveryIndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_recovery_exponent_zero_is_xor() {
        let mut par2 = par2(&[8], 4);
        par2.set_recovery_count(1);
        let mut files = par2.take_files().unwrap();
        files[0].process(&[1, 2, 3, 4], &mut par2).unwrap();
        files[0].process(&[5, 6, 7, 8], &mut par2).unwrap();
        par2.finalise().unwrap();

        let packet = par2.take_packet_recovery(0).unwrap();
        assert_eq!(packet.data(), &[1 ^ 5, 2 ^ 6, 3 ^ 7, 4 ^ 8]);
    }

    #[test]
    fn test_comment_packets() {
        let par2 = par2(&[10], 4096);
        let both = par2.make_packet_comment("héllo", CharEncoding::Both).unwrap();
        let packets = split_packets(&both);
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| verify_packet(p)));

        let (_, unicode) = decode_body::<CommentUnicodeBody>(packets[1]).unwrap();
        assert_eq!(&unicode.ascii_md5, &packets[0][16..32]);

        let alone = par2.make_packet_comment("héllo", CharEncoding::Unicode).unwrap();
        let (_, unicode) = decode_body::<CommentUnicodeBody>(&alone).unwrap();
        assert_eq!(unicode.ascii_md5, [0; 16]);

        // Auto stays ASCII for Latin-1 text
        let auto = par2.make_packet_comment("héllo", CharEncoding::Auto).unwrap();
        assert_eq!(split_packets(&auto).len(), 1);
        assert_eq!(&auto[48..64], b"PAR 2.0\0CommASCI");
    }

    #[test]
    fn test_recovery_size() {
        let par2 = par2(&[10], 4096);
        assert_eq!(par2.recovery_size(0), 0);
        assert_eq!(par2.recovery_size(3), (4096 + 68) * 3);
    }

    #[test]
    fn test_reconfigure_discards_recovery() {
        let mut par2 = par2(&[4], 4);
        par2.set_recovery_count(2);
        let mut files = par2.take_files().unwrap();
        files[0].process(&[9; 4], &mut par2).unwrap();
        par2.set_recovery_slices(&[]);
        assert!(par2.recovery_exponents().is_empty());
        par2.finalise().unwrap();
        assert!(par2.packet_recovery(0).is_err());
    }
}
