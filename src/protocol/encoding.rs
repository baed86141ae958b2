//! Text encodings and outgoing line assembly.
//!
//! Outgoing lines are built from [`Part`]s: raw bytes pass through, text is
//! encoded with the requested [`Encoding`], and absent optional parts are
//! dropped. Parts are joined with a single space and terminated with CRLF.

use super::LINE_TERMINATOR;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Character encoding used for text payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
    #[default]
    Utf8,
    /// ISO-8859-1: one byte per code point up to U+00FF.
    Latin1,
    Ascii,
}

impl Encoding {
    /// Encode text, borrowing when the bytes are identical to UTF-8.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>, EncodeError> {
        let limit = match self {
            Encoding::Utf8 => return Ok(Cow::Borrowed(text.as_bytes())),
            Encoding::Latin1 => 0xFF,
            Encoding::Ascii => 0x7F,
        };

        if text.is_ascii() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }

        text.chars()
            .map(|ch| {
                u8::try_from(u32::from(ch))
                    .ok()
                    .filter(|&b| u32::from(b) <= limit)
                    .ok_or(EncodeError::Unrepresentable {
                        encoding: *self,
                        ch,
                    })
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Cow::Owned)
    }

    /// Decode received bytes. Undecodable input becomes U+FFFD.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes),
            Encoding::Latin1 => match std::str::from_utf8(bytes) {
                Ok(text) if text.is_ascii() => Cow::Borrowed(text),
                _ => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
            },
            Encoding::Ascii => match std::str::from_utf8(bytes) {
                Ok(text) if text.is_ascii() => Cow::Borrowed(text),
                _ => Cow::Owned(
                    bytes
                        .iter()
                        .map(|&b| {
                            if b.is_ascii() {
                                char::from(b)
                            } else {
                                char::REPLACEMENT_CHARACTER
                            }
                        })
                        .collect(),
                ),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
            Encoding::Ascii => "ascii",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            other => Err(format!("unsupported encoding '{other}'")),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Text that cannot be expressed in the requested encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Unrepresentable { encoding: Encoding, ch: char },
}

/// One space-separated element of an outgoing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part<'a> {
    Text(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
    /// Dropped from the line; lets optional trailing arguments be passed as-is.
    Skip,
}

impl<'a> From<&'a str> for Part<'a> {
    fn from(text: &'a str) -> Self {
        Part::Text(Cow::Borrowed(text))
    }
}

impl<'a> From<&'a String> for Part<'a> {
    fn from(text: &'a String) -> Self {
        Part::Text(Cow::Borrowed(text.as_str()))
    }
}

impl From<String> for Part<'static> {
    fn from(text: String) -> Self {
        Part::Text(Cow::Owned(text))
    }
}

impl<'a> From<&'a [u8]> for Part<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Part::Bytes(Cow::Borrowed(bytes))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Part<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Part::Bytes(Cow::Borrowed(bytes.as_slice()))
    }
}

impl From<Vec<u8>> for Part<'static> {
    fn from(bytes: Vec<u8>) -> Self {
        Part::Bytes(Cow::Owned(bytes))
    }
}

impl<'a, T: Into<Part<'a>>> From<Option<T>> for Part<'a> {
    fn from(part: Option<T>) -> Self {
        part.map_or(Part::Skip, Into::into)
    }
}

/// Build a complete outgoing line: encoded parts joined by spaces, CRLF appended.
pub fn encode_line(parts: &[Part<'_>], encoding: Encoding) -> Result<Bytes, EncodeError> {
    let mut line = BytesMut::with_capacity(64);
    let mut first = true;

    for part in parts {
        let bytes = match part {
            Part::Text(text) => encoding.encode(text)?,
            Part::Bytes(bytes) => Cow::Borrowed(bytes.as_ref()),
            Part::Skip => continue,
        };
        if !first {
            line.put_u8(b' ');
        }
        line.put_slice(&bytes);
        first = false;
    }

    line.put_slice(LINE_TERMINATOR);
    Ok(line.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line_joins_and_terminates() {
        let parts: [Part<'_>; 3] = ["PRIVMSG".into(), "#test".into(), ":hello world".into()];
        let line = encode_line(&parts, Encoding::Utf8).unwrap();
        assert_eq!(&line[..], b"PRIVMSG #test :hello world\r\n");
    }

    #[test]
    fn test_skipped_parts_are_dropped() {
        let reason: Option<&str> = None;
        let parts: [Part<'_>; 3] = ["QUIT".into(), reason.into(), Part::Skip];
        let line = encode_line(&parts, Encoding::Utf8).unwrap();
        assert_eq!(&line[..], b"QUIT\r\n");

        let parts: [Part<'_>; 2] = ["QUIT".into(), Some(":bye").into()];
        let line = encode_line(&parts, Encoding::Utf8).unwrap();
        assert_eq!(&line[..], b"QUIT :bye\r\n");
    }

    #[test]
    fn test_bytes_pass_through() {
        let parts: [Part<'_>; 2] = ["PRIVMSG".into(), b"\xff\xfe".into()];
        let line = encode_line(&parts, Encoding::Ascii).unwrap();
        assert_eq!(&line[..], b"PRIVMSG \xff\xfe\r\n");
    }

    #[test]
    fn test_empty_parts_yield_bare_terminator() {
        let line = encode_line(&[], Encoding::Utf8).unwrap();
        assert_eq!(&line[..], b"\r\n");
    }

    #[test]
    fn test_latin1_encoding() {
        assert_eq!(Encoding::Latin1.encode("café").unwrap().as_ref(), b"caf\xe9");
        assert_eq!(
            Encoding::Latin1.encode("€"),
            Err(EncodeError::Unrepresentable {
                encoding: Encoding::Latin1,
                ch: '€'
            })
        );
    }

    #[test]
    fn test_ascii_rejects_non_ascii() {
        assert!(Encoding::Ascii.encode("plain").is_ok());
        assert!(Encoding::Ascii.encode("é").is_err());
    }

    #[test]
    fn test_decode() {
        assert_eq!(Encoding::Utf8.decode("héllo".as_bytes()), "héllo");
        assert_eq!(Encoding::Utf8.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(Encoding::Latin1.decode(b"caf\xe9"), "café");
        assert_eq!(Encoding::Ascii.decode(b"a\xe9"), "a\u{FFFD}");
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("latin_1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("iso-8859-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("ebcdic".parse::<Encoding>().is_err());
        assert_eq!(Encoding::Ascii.to_string(), "ascii");
    }
}
