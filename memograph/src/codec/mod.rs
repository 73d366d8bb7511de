//! Self-describing binary encoding for dynamic values.
//!
//! The native encoding is the canonical input to the cryptographic digest
//! and the default on-wire payload format: every value is a little-endian
//! `u32` type tag followed by a type-specific payload. MessagePack is
//! supported as a content-equivalent interchange encoding for external
//! peers (see [`WireEncoding`]); the native encoding stays canonical.

mod decode;
mod encode;
mod wire;

pub use decode::decode_value;
pub use encode::{encode_value, encoded_size};
pub use wire::WireEncoding;

use thiserror::Error;

/// Type tags used by the native encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum TypeTag {
    Nil = 0,
    Boolean = 1,
    Integer = 2,
    Float = 3,
    String = 4,
    Blob = 5,
    Datetime = 6,
    Array = 7,
    Map = 8,
}

impl TypeTag {
    pub(crate) fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Nil,
            1 => Self::Boolean,
            2 => Self::Integer,
            3 => Self::Float,
            4 => Self::String,
            5 => Self::Blob,
            6 => Self::Datetime,
            7 => Self::Array,
            8 => Self::Map,
            _ => return None,
        })
    }
}

/// Errors from encoding or decoding the native format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before the payload was complete.
    #[error("unexpected end of input: needed {needed} more bytes")]
    UnexpectedEnd { needed: usize },

    /// An unknown type tag was encountered.
    #[error("unknown type tag {0}")]
    UnknownTag(u32),

    /// A boolean payload byte was neither 0 nor 1.
    #[error("invalid boolean payload byte {0:#04x}")]
    InvalidBoolean(u8),

    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// A datetime payload was outside the representable range.
    #[error("datetime payload {0} ms is out of range")]
    InvalidDatetime(i64),

    /// A length prefix exceeded the addressable size on this host.
    #[error("length prefix {0} overflows the address space")]
    LengthOverflow(u64),

    /// Input remained after a complete value was decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// MessagePack interchange failure.
    #[error("messagepack: {0}")]
    MessagePack(String),
}
