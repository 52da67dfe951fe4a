//! Configuration for recovery set creation

use crate::engine::gf16::DEFAULT_ALIGNMENT;

/// Input slices accumulated before each coding-engine call
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Tunables for [`crate::Par2`] and [`crate::Par2Chunked`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Par2Options {
    /// Input slices staged per coding-engine call (minimum 1)
    pub batch_size: usize,
    /// Buffer alignment for the bundled engine
    pub alignment: usize,
}

impl Default for Par2Options {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl Par2Options {
    pub fn new(batch_size: usize, alignment: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            alignment,
        }
    }

    pub fn from_args(matches: &clap::ArgMatches) -> Self {
        let defaults = Self::default();
        let batch_size = matches
            .get_one::<String>("batch")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.batch_size);

        Self::new(batch_size, defaults.alignment)
    }

    /// Effective batch capacity
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Par2Options::default();
        assert_eq!(options.batch_size, 16);
        assert_eq!(options.alignment, DEFAULT_ALIGNMENT);
    }

    #[test]
    fn test_zero_batch_is_clamped() {
        assert_eq!(Par2Options::new(0, 64).effective_batch_size(), 1);
        let options = Par2Options {
            batch_size: 0,
            alignment: 64,
        };
        assert_eq!(options.effective_batch_size(), 1);
    }

    #[test]
    fn test_from_args() {
        let matches = clap::Command::new("test")
            .arg(clap::Arg::new("batch").long("batch"))
            .get_matches_from(["test", "--batch", "4"]);
        assert_eq!(Par2Options::from_args(&matches).batch_size, 4);

        let matches = clap::Command::new("test")
            .arg(clap::Arg::new("batch").long("batch"))
            .get_matches_from(["test"]);
        assert_eq!(Par2Options::from_args(&matches).batch_size, 16);
    }
}
