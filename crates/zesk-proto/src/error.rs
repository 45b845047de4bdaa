//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding storage values.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Stored format version does not match this build.
    #[error("format version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Encoded key bytes were malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}
