//! Error types for the sync protocol.

use devkv_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building, encoding or decoding protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Underlying CBOR error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A required message field is absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A message field has the wrong shape.
    #[error("invalid field '{field}': {message}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The message type code is not known.
    #[error("unknown message type {0}")]
    UnknownMessageType(i64),

    /// A device identifier failed validation.
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
}

impl ProtocolError {
    /// Create an invalid field error.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
