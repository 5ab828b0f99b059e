//! Error types for the record codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ended before a complete value could be read.
    #[error("unexpected end of record: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// How many bytes the read required.
        needed: usize,
        /// How many bytes were left.
        remaining: usize,
    },

    /// A string field contained invalid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidString,

    /// A null marker held something other than NULL or NOT_NULL.
    #[error("invalid null marker: {0:#06x}")]
    InvalidMarker(u16),

    /// A type id in the stream does not resolve to a known type name.
    #[error("unknown type id: {0}")]
    UnknownTypeId(i32),

    /// The serializer has no encoding for this type.
    #[error("serializer cannot handle type: {type_name}")]
    CannotHandle {
        /// Name of the unsupported type.
        type_name: String,
    },

    /// The stream structure is not what the decoder expects.
    #[error("invalid record format: {message}")]
    InvalidFormat {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Creates a cannot-handle error.
    pub fn cannot_handle(type_name: impl Into<String>) -> Self {
        Self::CannotHandle {
            type_name: type_name.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
