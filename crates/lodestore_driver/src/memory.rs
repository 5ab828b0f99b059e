//! In-memory storage driver for testing.

use crate::driver::StorageDriver;
use crate::error::{DriverError, DriverResult};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory storage driver.
///
/// This driver stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral catalogs that don't need persistence
///
/// # Thread Safety
///
/// This driver is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use lodestore_driver::{MemoryDriver, StorageDriver};
///
/// let driver = MemoryDriver::new();
/// driver.save_instance("users", 0, b"payload").unwrap();
/// assert_eq!(driver.load_instance("users", 0).unwrap(), b"payload");
/// ```
#[derive(Debug, Default)]
pub struct MemoryDriver {
    instances: RwLock<HashMap<(String, u64), Vec<u8>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryDriver {
    /// Creates a new empty in-memory driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored instances across all tables.
    ///
    /// Useful for asserting write counts in tests.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Returns the number of stored instances for one table.
    #[must_use]
    pub fn table_count(&self, table: &str) -> usize {
        self.instances
            .read()
            .keys()
            .filter(|(t, _)| t == table)
            .count()
    }

    fn keys_blob(table: &str) -> String {
        format!("keys/{table}")
    }

    fn index_blob(table: &str, index: &str) -> String {
        format!("index/{table}/{index}")
    }
}

const TYPE_INDEX_BLOB: &str = "type_index";

impl StorageDriver for MemoryDriver {
    fn save_instance(&self, table: &str, slot: u64, bytes: &[u8]) -> DriverResult<()> {
        self.instances
            .write()
            .insert((table.to_string(), slot), bytes.to_vec());
        Ok(())
    }

    fn load_instance(&self, table: &str, slot: u64) -> DriverResult<Vec<u8>> {
        self.instances
            .read()
            .get(&(table.to_string(), slot))
            .cloned()
            .ok_or_else(|| DriverError::SlotNotFound {
                table: table.to_string(),
                slot,
            })
    }

    fn delete_instance(&self, table: &str, slot: u64) -> DriverResult<()> {
        self.instances.write().remove(&(table.to_string(), slot));
        Ok(())
    }

    fn truncate(&self, table: &str) -> DriverResult<()> {
        self.instances.write().retain(|(t, _), _| t != table);
        let keys_blob = Self::keys_blob(table);
        let index_prefix = format!("index/{table}/");
        self.blobs
            .write()
            .retain(|name, _| *name != keys_blob && !name.starts_with(&index_prefix));
        Ok(())
    }

    fn purge(&self) -> DriverResult<()> {
        self.instances.write().clear();
        self.blobs.write().clear();
        Ok(())
    }

    fn save_keys(&self, table: &str, bytes: &[u8]) -> DriverResult<()> {
        self.blobs
            .write()
            .insert(Self::keys_blob(table), bytes.to_vec());
        Ok(())
    }

    fn load_keys(&self, table: &str) -> DriverResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(&Self::keys_blob(table)).cloned())
    }

    fn save_index(&self, table: &str, index: &str, bytes: &[u8]) -> DriverResult<()> {
        self.blobs
            .write()
            .insert(Self::index_blob(table, index), bytes.to_vec());
        Ok(())
    }

    fn load_index(&self, table: &str, index: &str) -> DriverResult<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .get(&Self::index_blob(table, index))
            .cloned())
    }

    fn save_type_index(&self, bytes: &[u8]) -> DriverResult<()> {
        self.blobs
            .write()
            .insert(TYPE_INDEX_BLOB.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load_type_index(&self) -> DriverResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(TYPE_INDEX_BLOB).cloned())
    }
}
