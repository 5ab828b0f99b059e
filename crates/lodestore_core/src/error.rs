//! Engine error taxonomy.

use crate::trigger::TriggerKind;
use lodestore_codec::CodecError;
use lodestore_driver::DriverError;
use thiserror::Error;

/// Errors surfaced by catalog operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage driver failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Encoding or decoding instance bytes failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The named type has no registered table and no alias to one.
    #[error("no table registered for type '{type_name}'")]
    TableNotFound {
        /// The type name that failed to resolve.
        type_name: String,
    },

    /// A table for this type name is already registered.
    #[error("table for type '{type_name}' is already registered")]
    DuplicateTable {
        /// The conflicting type name.
        type_name: String,
    },

    /// An index with this name already exists on the table.
    #[error("index '{index}' already exists on table '{type_name}'")]
    DuplicateIndex {
        /// The table's type name.
        type_name: String,
        /// The conflicting index name.
        index: String,
    },

    /// The named index does not exist on the table.
    #[error("no index '{index}' on table '{type_name}'")]
    IndexNotFound {
        /// The table's type name.
        type_name: String,
        /// The missing index name.
        index: String,
    },

    /// A trigger vetoed the operation before it touched any state.
    #[error("{kind} of '{type_name}' suppressed by trigger")]
    TriggerSuppressed {
        /// Which operation was vetoed.
        kind: TriggerKind,
        /// The table's type name.
        type_name: String,
    },

    /// The catalog was used in the wrong lifecycle state.
    #[error("catalog misuse: {message}")]
    ActivationMisuse {
        /// What went wrong.
        message: String,
    },

    /// A lock could not be acquired within the configured timeout.
    #[error("operation '{operation}' timed out waiting for a table lock")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// A batch operation observed its cancellation token.
    #[error("operation '{operation}' was canceled")]
    Canceled {
        /// The operation that was canceled.
        operation: String,
    },

    /// A destructive operation ran while other operations were in flight.
    #[error("cannot run destructive operation with {in_flight} operation(s) in flight")]
    Busy {
        /// Number of concurrent operations observed.
        in_flight: usize,
    },

    /// A persisted blob failed structural validation.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// What failed to validate.
        message: String,
    },
}

impl StoreError {
    /// Builds a [`StoreError::TableNotFound`].
    pub fn table_not_found(type_name: impl Into<String>) -> Self {
        StoreError::TableNotFound {
            type_name: type_name.into(),
        }
    }

    /// Builds a [`StoreError::ActivationMisuse`].
    pub fn misuse(message: impl Into<String>) -> Self {
        StoreError::ActivationMisuse {
            message: message.into(),
        }
    }

    /// Builds a [`StoreError::Timeout`].
    pub fn timeout(operation: impl Into<String>) -> Self {
        StoreError::Timeout {
            operation: operation.into(),
        }
    }

    /// Builds a [`StoreError::Canceled`].
    pub fn canceled(operation: impl Into<String>) -> Self {
        StoreError::Canceled {
            operation: operation.into(),
        }
    }

    /// Builds a [`StoreError::InvalidFormat`].
    pub fn invalid_format(message: impl Into<String>) -> Self {
        StoreError::InvalidFormat {
            message: message.into(),
        }
    }
}

/// Convenience alias for engine results.
pub type StoreResult<T> = Result<T, StoreError>;
