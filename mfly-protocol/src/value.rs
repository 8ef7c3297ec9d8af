//! RESP value sum type and encoding.

/// First byte of a simple string frame.
pub const SIMPLE_STRING_BYTE: u8 = b'+';
/// First byte of an error frame.
pub const ERROR_BYTE: u8 = b'-';
/// First byte of an integer frame.
pub const INTEGER_BYTE: u8 = b':';
/// First byte of a bulk string frame.
pub const BULK_STRING_BYTE: u8 = b'$';
/// First byte of an array frame.
pub const ARRAY_BYTE: u8 = b'*';

/// One decodable RESP value.
///
/// `RawBulk` is transport-only: it encodes as a bulk string without the trailing CRLF and is
/// used exactly once, to ship the snapshot payload during a full resync. Decoding never
/// produces it; a headless bulk on the wire decodes as `BulkString`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    /// `+...` reply line.
    SimpleString(String),
    /// `-...` error line carrying the complete error text (including any `ERR` prefix).
    Error(String),
    /// `:<n>` signed 64-bit integer.
    Integer(i64),
    /// `$<len>` binary-safe payload.
    BulkString(Vec<u8>),
    /// `$-1` null bulk string.
    NullBulk,
    /// `*<len>` nested frame list.
    Array(Vec<WireValue>),
    /// Bulk-framed payload with no trailing CRLF (snapshot transfer only).
    RawBulk(Vec<u8>),
}

impl WireValue {
    /// Builds a bulk string from anything byte-like.
    #[must_use]
    pub fn bulk(payload: impl Into<Vec<u8>>) -> Self {
        Self::BulkString(payload.into())
    }

    /// Builds the canonical request array of bulk strings.
    #[must_use]
    pub fn command(parts: &[&[u8]]) -> Self {
        Self::Array(parts.iter().map(|part| Self::bulk(*part)).collect())
    }

    /// Encodes this value into wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::SimpleString(value) => {
                let mut output = Vec::with_capacity(value.len() + 3);
                output.push(SIMPLE_STRING_BYTE);
                output.extend_from_slice(value.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::Error(message) => {
                let mut output = Vec::with_capacity(message.len() + 3);
                output.push(ERROR_BYTE);
                output.extend_from_slice(message.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::Integer(value) => format!(":{value}\r\n").into_bytes(),
            Self::BulkString(value) => {
                let mut output = format!("${}\r\n", value.len()).into_bytes();
                output.extend_from_slice(value);
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::NullBulk => b"$-1\r\n".to_vec(),
            Self::Array(items) => {
                let mut output = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    output.extend_from_slice(&item.to_bytes());
                }
                output
            }
            Self::RawBulk(value) => {
                let mut output = format!("${}\r\n", value.len()).into_bytes();
                output.extend_from_slice(value);
                output
            }
        }
    }

    /// Returns the textual payload of string-like values, or `None` otherwise.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::SimpleString(value) => Some(value),
            Self::BulkString(value) | Self::RawBulk(value) => std::str::from_utf8(value).ok(),
            _ => None,
        }
    }

    /// Returns the raw payload of bulk-like values, or `None` otherwise.
    #[must_use]
    pub fn as_bytes_payload(&self) -> Option<&[u8]> {
        match self {
            Self::BulkString(value) | Self::RawBulk(value) => Some(value),
            Self::SimpleString(value) => Some(value.as_bytes()),
            _ => None,
        }
    }
}
