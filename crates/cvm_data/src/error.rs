use thiserror::Error;

use crate::hash::Hash;

/// Malformed, truncated, oversized or non-canonical byte input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("truncated input")]
    Truncated,
    #[error("{0} trailing bytes after encoded value")]
    TrailingBytes(usize),
    #[error("unknown tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("unknown op type 0x{0:02x}")]
    UnknownOpType(u8),
    #[error("unknown core function id {0}")]
    UnknownCoreFn(u8),
    #[error("VLC integer longer than 10 bytes")]
    VlcTooLong,
    #[error("VLC integer out of 64-bit range")]
    VlcOverflow,
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),
    #[error("encoding length {len} exceeds limit {limit}")]
    TooLong { len: usize, limit: usize },
    #[error("invalid UTF-8 text")]
    InvalidUtf8,
    #[error("bad message length {0}")]
    BadMessageLength(i64),
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: Hash, actual: Hash },
    #[error("invalid structure: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("format: {0}")]
    Format(#[from] FormatError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("missing data: {0}")]
    MissingData(Hash),
    #[error("index {index} out of bounds for count {count}")]
    IndexOutOfBounds { index: u64, count: u64 },
}

pub type Result<T> = std::result::Result<T, CoreError>;

pub(crate) fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::Format(FormatError::Invalid(msg.into()))
}
