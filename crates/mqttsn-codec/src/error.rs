use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

/// Typed decode/encode failures. Malformed input never panics; every decode
/// path reports one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("short buffer: needed {needed} bytes, {available} available")]
    ShortBuffer { needed: usize, available: usize },

    #[error("invalid frame length: {0}")]
    InvalidLength(usize),

    #[error("unknown message type: 0x{0:02X}")]
    UnknownType(u8),

    #[error("field out of range: {0}")]
    FieldOutOfRange(&'static str),

    #[error("invalid protection scheme: 0x{0:02X}")]
    InvalidProtectionScheme(u8),

    #[error("invalid integrity layout: {0}")]
    InvalidIntegrityLayout(&'static str),
}
