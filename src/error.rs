//! Error types for PAR2 creation

use crate::engine::EngineError;
use thiserror::Error;

/// Errors raised while building a recovery set
///
/// Every variant is a hard failure: the encoder is deterministic, so the caller
/// has to fix its input or its call sequence and start again.
#[derive(Debug, Error)]
pub enum Par2Error {
    /// Slice size is zero or not a multiple of 4
    #[error("Slice size must be a non-zero multiple of 4 (got {0})")]
    InvalidSliceSize(u64),

    /// Chunk size given to the chunked streamer is odd
    #[error("Chunk size must be a multiple of 2 (got {0})")]
    InvalidChunkSize(usize),

    /// Packet body would not keep packets 4-byte aligned
    #[error("Packet length must be a multiple of 4 (body is {0} bytes)")]
    UnalignedPacketLength(usize),

    /// Text encoding option not valid for the requested packet
    #[error("Unknown unicode option: {0}")]
    UnknownEncoding(String),

    /// More slices were fed to a file than it has
    #[error("Too many slices given for file {name} ({num_slices} slices)")]
    TooManySlices { name: String, num_slices: u32 },

    /// Slice data length does not match the slot
    #[error("Invalid data length for slice {slice} of {name}: expected {expected}, got {actual}")]
    InvalidDataLength {
        name: String,
        slice: u32,
        expected: usize,
        actual: usize,
    },

    /// Data handed to the pipeline is larger than the buffered unit
    #[error("Slice data of {actual} bytes does not fit a {unit} byte unit")]
    OversizedInput { actual: usize, unit: usize },

    /// Unit size changed while inputs were still staged
    #[error("Cannot switch to {unit} byte units with {staged} inputs staged")]
    StagingUnitChanged { staged: usize, unit: usize },

    /// Description packet requested before all data was streamed
    #[error("MD5 of file {0} not available. Ensure that all data has been read and processed.")]
    FileMd5Unavailable(String),

    /// Packet was already handed out by value
    #[error("{0} packet has already been consumed")]
    PacketConsumed(&'static str),

    /// File list was already handed out by value
    #[error("File list has already been consumed")]
    FilesConsumed,

    /// Recovery slice index outside the configured set
    #[error("Recovery slice {index} out of range ({count} configured)")]
    RecoveryIndexOutOfRange { index: usize, count: usize },

    /// Chunked operation without any recovery slices
    #[error("Must supply recovery slices for chunked operation")]
    NoRecoverySlices,

    /// Chunked streamer was created without a packet header template
    #[error("Need MD5 hash to generate header")]
    NoHeaderTemplate,

    /// Chunk data arrived after the recovery header was produced
    #[error("Cannot process data after packet header has been generated")]
    HeaderAlreadyGenerated,

    /// Chunk data handed to the recovery header builder does not add up
    #[error("Length of recovery slice ({actual}) doesn't match PAR2 slice size ({expected})")]
    RecoveryLengthMismatch { expected: u64, actual: u64 },

    /// Too many input slices or recovery slices for GF(2^16)
    #[error("Recovery set too large: {0}")]
    TooLarge(String),

    /// Failure reported by the coding engine
    #[error("Coding engine error: {0}")]
    Engine(#[from] EngineError),

    /// Packet body could not be serialized
    #[error("Packet serialization failed: {0}")]
    Serialize(#[from] binrw::Error),

    /// I/O error from a collaborator (file info, packet writing)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Result with Par2Error
pub type Result<T> = std::result::Result<T, Par2Error>;
