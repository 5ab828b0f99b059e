//! Error types for driver operations.

use std::io;
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur during storage driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// An I/O error occurred, with driver-identifying context.
    #[error("{driver} driver I/O failure at {context}: {source}")]
    Access {
        /// Name of the driver that failed.
        driver: &'static str,
        /// What the driver was doing (path or operation).
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// No instance is stored at the requested slot.
    #[error("no instance stored for table {table} at slot {slot}")]
    SlotNotFound {
        /// The table searched.
        table: String,
        /// The slot index that was not found.
        slot: u64,
    },

    /// Another process holds the storage lock.
    #[error("storage locked: another process has exclusive access")]
    Locked,

    /// The storage layout is not what the driver expects.
    #[error("invalid storage layout: {0}")]
    InvalidLayout(String),
}

impl DriverError {
    /// Creates an access error with driver and path context.
    pub fn access(driver: &'static str, context: impl Into<String>, source: io::Error) -> Self {
        Self::Access {
            driver,
            context: context.into(),
            source,
        }
    }
}
