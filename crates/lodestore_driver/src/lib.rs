//! # Lodestore Driver
//!
//! Storage driver trait and implementations for Lodestore.
//!
//! Drivers are opaque byte repositories keyed by `(table, slot)` with
//! a handful of metadata blob slots. All byte-format interpretation
//! happens above this crate; a driver never inspects what it stores.
//!
//! ## Implementations
//!
//! - [`MemoryDriver`] - in-memory maps, for tests and ephemeral stores
//! - [`FileDriver`] - one directory per table, one file per slot,
//!   exclusive advisory lock on the root

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod file;
mod memory;

pub use driver::StorageDriver;
pub use error::{DriverError, DriverResult};
pub use file::FileDriver;
pub use memory::MemoryDriver;
