//! Storage driver trait definition.

use crate::error::DriverResult;

/// A low-level storage driver for Lodestore.
///
/// Drivers are **opaque byte repositories**. They store serialized
/// instances keyed by `(table, slot)` and a handful of opaque metadata
/// blobs (key tables, index tables, the type index). Lodestore owns all
/// byte-format interpretation - drivers do not understand records,
/// keys, or indexes.
///
/// # Invariants
///
/// - `load_instance` returns exactly the bytes previously saved for
///   that `(table, slot)` pair, or `SlotNotFound`
/// - `truncate` removes every instance and metadata blob for one table
/// - `purge` removes everything the driver holds
/// - blob loads return `Ok(None)` when nothing was ever saved
/// - Drivers must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryDriver`] - For testing and ephemeral stores
/// - [`super::FileDriver`] - For persistent storage
pub trait StorageDriver: Send + Sync {
    /// Saves serialized instance bytes at `(table, slot)`.
    ///
    /// Overwrites any bytes previously stored at that slot.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn save_instance(&self, table: &str, slot: u64, bytes: &[u8]) -> DriverResult<()>;

    /// Loads the instance bytes stored at `(table, slot)`.
    ///
    /// # Errors
    ///
    /// Returns `SlotNotFound` if nothing is stored there, or an I/O
    /// error from the underlying store.
    fn load_instance(&self, table: &str, slot: u64) -> DriverResult<Vec<u8>>;

    /// Deletes the instance stored at `(table, slot)`.
    ///
    /// Deleting an absent slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn delete_instance(&self, table: &str, slot: u64) -> DriverResult<()>;

    /// Removes every instance and metadata blob belonging to `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn truncate(&self, table: &str) -> DriverResult<()>;

    /// Removes everything this driver holds, across all tables.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn purge(&self) -> DriverResult<()>;

    /// Persists the serialized key table for `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn save_keys(&self, table: &str, bytes: &[u8]) -> DriverResult<()>;

    /// Loads the serialized key table for `table`, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load_keys(&self, table: &str) -> DriverResult<Option<Vec<u8>>>;

    /// Persists the serialized index table `(table, index)`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn save_index(&self, table: &str, index: &str, bytes: &[u8]) -> DriverResult<()>;

    /// Loads the serialized index table `(table, index)`, if saved.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load_index(&self, table: &str, index: &str) -> DriverResult<Option<Vec<u8>>>;

    /// Persists the serialized type index.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn save_type_index(&self, bytes: &[u8]) -> DriverResult<()>;

    /// Loads the serialized type index, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load_type_index(&self) -> DriverResult<Option<Vec<u8>>>;
}
