//! The "modified UTF-8" encoding used by `CONSTANT_Utf8` entries.
//!
//! It differs from standard UTF-8 in two ways: the null character is written as the two bytes
//! `0xC0 0x80`, and supplementary characters are written as a surrogate pair of three-byte
//! sequences instead of a single four-byte sequence.

use std::error;
use std::fmt;

/// A byte sequence that is not valid modified UTF-8, or decodes to an unpaired surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    /// Offset of the offending byte within the input.
    pub offset: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid modified UTF-8 at byte {}", self.offset)
    }
}

impl error::Error for DecodeError {}

/// Bytes that may never appear anywhere in a `CONSTANT_Utf8` entry.
pub fn is_forbidden_byte(byte: u8) -> bool {
    byte == 0 || byte >= 0xf0
}

pub fn to_modified_utf8(string: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007f => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                bytes.push(0xc0 | (unit >> 6) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                bytes.push(0xe0 | (unit >> 12) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    bytes
}

pub fn from_modified_utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i] as u16;
        match bytes[i] {
            0x01..=0x7f => {
                units.push(byte);
                i += 1;
            }
            0xc0..=0xdf => {
                let second = continuation(bytes, i + 1)?;
                units.push(((byte & 0x1f) << 6) | second);
                i += 2;
            }
            0xe0..=0xef => {
                let second = continuation(bytes, i + 1)?;
                let third = continuation(bytes, i + 2)?;
                units.push(((byte & 0x0f) << 12) | (second << 6) | third);
                i += 3;
            }
            _ => return Err(DecodeError { offset: i }),
        }
    }
    String::from_utf16(&units).map_err(|_| DecodeError { offset: bytes.len() })
}

fn continuation(bytes: &[u8], offset: usize) -> Result<u16, DecodeError> {
    match bytes.get(offset) {
        Some(&byte) if byte & 0xc0 == 0x80 => Ok((byte & 0x3f) as u16),
        _ => Err(DecodeError { offset }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ascii_is_unchanged() {
        assert_eq!(to_modified_utf8("java/lang/Object"), b"java/lang/Object".to_vec());
        assert_eq!(from_modified_utf8(b"<init>").unwrap(), "<init>");
    }

    #[test]
    fn null_uses_two_bytes() {
        assert_eq!(to_modified_utf8("a\0b"), vec![b'a', 0xc0, 0x80, b'b']);
        assert_eq!(from_modified_utf8(&[b'a', 0xc0, 0x80, b'b']).unwrap(), "a\0b");
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let encoded = to_modified_utf8("\u{1F600}");
        assert_eq!(encoded, vec![0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]);
        assert!(encoded.iter().all(|&b| !is_forbidden_byte(b)));
        assert_eq!(from_modified_utf8(&encoded).unwrap(), "\u{1F600}");
    }

    #[test]
    fn two_and_three_byte_forms() {
        assert_eq!(to_modified_utf8("é"), vec![0xc3, 0xa9]);
        assert_eq!(to_modified_utf8("€"), vec![0xe2, 0x82, 0xac]);
        assert_eq!(from_modified_utf8(&[0xc3, 0xa9, 0xe2, 0x82, 0xac]).unwrap(), "é€");
    }

    #[test]
    fn rejects_truncated_and_forbidden_sequences() {
        assert_eq!(from_modified_utf8(&[b'a', 0xe2, 0x82]), Err(DecodeError { offset: 3 }));
        assert_eq!(from_modified_utf8(&[0xf0, 0x9f]), Err(DecodeError { offset: 0 }));
        assert_eq!(from_modified_utf8(&[b'x', 0]), Err(DecodeError { offset: 1 }));
        // an unpaired high surrogate
        assert!(from_modified_utf8(&[0xed, 0xa0, 0xbd]).is_err());
    }
}
