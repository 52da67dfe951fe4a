//! Text fields in PAR2 packets
//!
//! PAR2 stores names and comments twice over: as 8-bit text and, when that
//! loses information, as UTF-16LE in a companion packet. The 8-bit form keeps
//! the low byte of every UTF-16 code unit, so its length in bytes equals the
//! UTF-16 length of the string. Both forms are zero-padded to 4 bytes.

use crate::error::Par2Error;
use std::str::FromStr;

/// Which text packets to produce for a name or comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharEncoding {
    /// `Both` if the text has code units above U+00FF, otherwise `Ascii`
    #[default]
    Auto,
    Both,
    Ascii,
    Unicode,
}

impl CharEncoding {
    /// Replace `Auto` with the concrete choice for `text`
    pub fn resolve(self, text: &str) -> Self {
        match self {
            CharEncoding::Auto if has_unicode(text) => CharEncoding::Both,
            CharEncoding::Auto => CharEncoding::Ascii,
            other => other,
        }
    }

    pub fn includes_ascii(self) -> bool {
        matches!(self, CharEncoding::Both | CharEncoding::Ascii)
    }

    pub fn includes_unicode(self) -> bool {
        matches!(self, CharEncoding::Both | CharEncoding::Unicode)
    }
}

impl FromStr for CharEncoding {
    type Err = Par2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(CharEncoding::Auto),
            "both" => Ok(CharEncoding::Both),
            "ascii" => Ok(CharEncoding::Ascii),
            "unicode" => Ok(CharEncoding::Unicode),
            _ => Err(Par2Error::UnknownEncoding(s.to_string())),
        }
    }
}

/// Whether `text` needs a Unicode packet to survive
pub fn has_unicode(text: &str) -> bool {
    text.encode_utf16().any(|unit| unit > 0xFF)
}

/// 8-bit form of `text`, unpadded (used in file IDs)
pub fn ascii_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16().map(|unit| unit as u8).collect()
}

/// Round up to the next multiple of 4
#[inline]
pub fn pad4(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// 8-bit form of `text`, zero-padded to 4 bytes
pub fn padded_ascii(text: &str) -> Vec<u8> {
    let mut bytes = ascii_bytes(text);
    bytes.resize(pad4(bytes.len()), 0);
    bytes
}

/// UTF-16LE form of `text`, zero-padded to 4 bytes
pub fn padded_utf16(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    bytes.resize(pad4(bytes.len()), 0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_auto() {
        assert_eq!(CharEncoding::Auto.resolve("plain.txt"), CharEncoding::Ascii);
        // Latin-1 still fits in 8 bits
        assert_eq!(CharEncoding::Auto.resolve("café"), CharEncoding::Ascii);
        assert_eq!(CharEncoding::Auto.resolve("日本.txt"), CharEncoding::Both);
        assert_eq!(CharEncoding::Unicode.resolve("plain"), CharEncoding::Unicode);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("both".parse::<CharEncoding>().unwrap(), CharEncoding::Both);
        assert_eq!("ASCII".parse::<CharEncoding>().unwrap(), CharEncoding::Ascii);
        assert!(matches!(
            "utf8".parse::<CharEncoding>(),
            Err(Par2Error::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_ascii_keeps_low_byte() {
        assert_eq!(ascii_bytes("é"), vec![0xE9]);
        assert_eq!(ascii_bytes("\u{0141}"), vec![0x41]);
    }

    #[test]
    fn test_padding() {
        assert_eq!(padded_ascii("abc"), b"abc\0".to_vec());
        assert_eq!(padded_ascii("abcd"), b"abcd".to_vec());
        assert_eq!(padded_ascii(""), Vec::<u8>::new());
        assert_eq!(padded_utf16("a"), vec![b'a', 0, 0, 0]);
        assert_eq!(padded_utf16("ab"), vec![b'a', 0, b'b', 0]);
    }
}
