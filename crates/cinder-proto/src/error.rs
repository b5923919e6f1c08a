//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Errors raised while framing or (de)serializing protocol messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Message serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// Message deserialization failed.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// The frame header did not start with the protocol magic.
    #[error("invalid frame magic: {0:08x}")]
    InvalidMagic(u32),

    /// The frame announced a payload larger than the protocol allows.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The peer closed the stream in the middle of a frame.
    #[error("stream ended inside a frame ({0} bytes buffered)")]
    TruncatedFrame(usize),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;
