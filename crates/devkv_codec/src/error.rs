//! Codec errors.

use thiserror::Error;

/// Result alias used throughout the codec.
pub type CodecResult<T> = Result<T, CodecError>;

/// Why bytes could not be read as a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ends inside an item.
    #[error("input ends inside an item")]
    UnexpectedEof,

    /// A well-formed item that is not in canonical form.
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),

    /// Bytes that do not form a valid item.
    #[error("malformed item: {message}")]
    InvalidStructure {
        /// What is wrong.
        message: String,
    },

    /// A CBOR feature the store format never produces.
    #[error("unsupported item: {0}")]
    Unsupported(String),

    /// A length prefix above the decoder's limit.
    #[error("length {claimed} exceeds the limit of {limit}")]
    TooLong {
        /// Length announced by the input.
        claimed: u64,
        /// Largest accepted length.
        limit: u64,
    },

    /// Nesting deeper than the decoder accepts.
    #[error("items nested deeper than {0} levels")]
    TooDeep(usize),

    /// A text item that is not UTF-8.
    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    /// An integer outside the target range.
    #[error("integer out of range")]
    IntegerOverflow,

    /// A typed value tag that this codec does not know.
    #[error("unknown value type code {code}")]
    UnknownValueType {
        /// The code found on the wire.
        code: u64,
    },

    /// The payload of a typed value does not match its tag.
    #[error("typed value mismatch: tag {expected} carries {found}")]
    TypeMismatch {
        /// Type announced by the tag.
        expected: &'static str,
        /// Kind of CBOR item actually found.
        found: &'static str,
    },
}

impl CodecError {
    /// A malformed-item error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// A tag/payload mismatch.
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }
}
