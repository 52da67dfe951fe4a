//! Creation of PAR2 recovery sets
//!
//! The crate turns a set of input files into the packets of a PAR2 recovery
//! set: Main, per-file description and slice checksum packets, Creator and
//! Comment packets, and recovery slice packets computed with a Reed-Solomon
//! code over GF(2^16).
//!
//! ```no_run
//! use par2gen::{CharEncoding, FileInfo, Par2};
//! use std::path::Path;
//!
//! # fn main() -> par2gen::Result<()> {
//! let info = FileInfo::from_path(Path::new("data.bin"))?;
//! let mut par2 = Par2::new(vec![info], 4096)?;
//! par2.set_recovery_count(2);
//!
//! let mut files = par2.take_files()?;
//! # let slices: Vec<Vec<u8>> = Vec::new();
//! for slice in &slices {
//!     files[0].process(slice, &mut par2)?;
//! }
//! par2.finalise()?;
//!
//! let description = files[0].make_packet_description(CharEncoding::Auto)?;
//! let recovery = par2.take_packet_recovery(0)?;
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod chunked;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod file;
pub mod packets;
pub mod par2;
pub mod pipeline;

pub use chunked::{ChunkDigest, Par2Chunked};
pub use config::Par2Options;
pub use domain::{Crc32Value, FileId, GlobalSliceIndex, LocalSliceIndex, Md5Hash, RecoverySetId};
pub use engine::{AlignedBuffer, EngineError, Gf16Engine, RecoveryEngine};
pub use error::{Par2Error, Result};
pub use file::{FileInfo, Par2File};
pub use packets::{CharEncoding, RECOVERY_HEADER_SIZE};
pub use par2::{Par2, RecoveryPacket};
pub use pipeline::BatchPipeline;

/// Creator string written by this crate
pub const CREATOR: &str = concat!("par2gen v", env!("CARGO_PKG_VERSION"));
