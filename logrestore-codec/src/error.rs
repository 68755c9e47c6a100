use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid group marker {0:#04x}")]
    InvalidMarker(u8),
    #[error("invalid group padding")]
    InvalidPadding,
    #[error("varint overflows 64-bit integer")]
    VarintOverflow,
    #[error("trailing bytes after {0}")]
    TrailingBytes(&'static str),
    #[error("invalid meta key: {0}")]
    InvalidMetaKey(&'static str),
    #[error("invalid meta field {0:?}")]
    InvalidMetaField(String),
    #[error("unknown write type {0:#04x}")]
    UnknownWriteType(u8),
    #[error("unknown write flag {0:#04x}")]
    UnknownWriteFlag(u8),
    #[error("short value too long({0})")]
    ShortValueTooLong(usize),
}
