//! Key-to-slot mapping for one table.
//!
//! The key table is the authoritative in-memory list of live keys. It
//! maps every key to the storage slot holding its instance bytes.
//! Slots are handed out monotonically and never reused: deleting a key
//! retires its slot, and truncating the table leaves the counter
//! intact so later inserts cannot collide with stale driver state.

use crate::error::{StoreError, StoreResult};
use crate::types::{Key, SlotIndex};
use lodestore_codec::{RecordReader, RecordWriter};
use lodestore_driver::StorageDriver;
use std::collections::BTreeMap;

const MAGIC: &[u8; 4] = b"LSKT";
const VERSION: u16 = 1;

/// Ordered key-to-slot map with a monotonic slot counter.
#[derive(Debug, Default)]
pub struct KeyTable {
    map: BTreeMap<Key, SlotIndex>,
    next_slot: u64,
    dirty: bool,
}

impl KeyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        KeyTable::default()
    }

    /// Returns the slot for a key, assigning a fresh slot if the key
    /// is new. Saving an existing key reuses its slot.
    pub fn add(&mut self, key: Key) -> SlotIndex {
        if let Some(slot) = self.map.get(&key) {
            return *slot;
        }
        let slot = SlotIndex::new(self.next_slot);
        self.next_slot += 1;
        self.map.insert(key, slot);
        self.dirty = true;
        slot
    }

    /// Looks up the slot for a key.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<SlotIndex> {
        self.map.get(key).copied()
    }

    /// Removes a key, returning its retired slot.
    pub fn remove(&mut self, key: &Key) -> Option<SlotIndex> {
        let slot = self.map.remove(key);
        if slot.is_some() {
            self.dirty = true;
        }
        slot
    }

    /// Removes every key. The slot counter is preserved.
    pub fn clear(&mut self) {
        if !self.map.is_empty() {
            self.dirty = true;
        }
        self.map.clear();
    }

    /// Restores a key at a recorded slot, advancing the counter past
    /// it. Used when rebuilding from a backup stream.
    pub(crate) fn insert_with_slot(&mut self, key: Key, slot: SlotIndex) {
        self.next_slot = self.next_slot.max(slot.as_u64() + 1);
        self.map.insert(key, slot);
        self.dirty = true;
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates live keys and slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, SlotIndex)> {
        self.map.iter().map(|(k, s)| (k, *s))
    }

    /// Live keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.map.keys()
    }

    /// True if the table changed since the last flush.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.put_blob(MAGIC);
        w.put_u16(VERSION);
        w.put_u64(self.next_slot);
        #[allow(clippy::cast_possible_truncation)]
        w.put_u32(self.map.len() as u32);
        for (key, slot) in &self.map {
            key.encode(&mut w);
            w.put_u64(slot.as_u64());
        }
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut r = RecordReader::new(bytes);
        if r.get_blob()? != MAGIC {
            return Err(StoreError::invalid_format("bad key table magic"));
        }
        let version = r.get_u16()?;
        if version != VERSION {
            return Err(StoreError::invalid_format(format!(
                "unsupported key table version: {version}"
            )));
        }
        let next_slot = r.get_u64()?;
        let count = r.get_u32()? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = Key::decode(&mut r)?;
            let slot = SlotIndex::new(r.get_u64()?);
            map.insert(key, slot);
        }
        Ok(KeyTable {
            map,
            next_slot,
            dirty: false,
        })
    }

    /// Persists the table through the driver if it is dirty.
    ///
    /// # Errors
    ///
    /// Returns driver errors unchanged.
    pub fn flush(&mut self, driver: &dyn StorageDriver, table: &str) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        driver.save_keys(table, &self.encode())?;
        self.dirty = false;
        Ok(())
    }

    /// Replaces in-memory state with the driver's copy, flushing any
    /// pending changes first. A missing blob resets to empty while
    /// keeping the current slot counter.
    ///
    /// # Errors
    ///
    /// Returns driver errors and blob corruption unchanged.
    pub fn reload(&mut self, driver: &dyn StorageDriver, table: &str) -> StoreResult<()> {
        self.flush(driver, table)?;
        match driver.load_keys(table)? {
            Some(bytes) => *self = Self::decode(&bytes)?,
            None => {
                self.map.clear();
                self.dirty = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestore_driver::MemoryDriver;

    #[test]
    fn slots_are_monotonic_and_never_reused() {
        let mut table = KeyTable::new();
        let a = table.add(Key::Int(1));
        let b = table.add(Key::Int(2));
        assert!(b > a);

        table.remove(&Key::Int(1));
        let c = table.add(Key::Int(1));
        assert!(c > b, "retired slot must not come back");
    }

    #[test]
    fn resave_keeps_the_slot() {
        let mut table = KeyTable::new();
        let first = table.add(Key::Text("k".into()));
        let again = table.add(Key::Text("k".into()));
        assert_eq!(first, again);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn clear_preserves_the_counter() {
        let mut table = KeyTable::new();
        table.add(Key::Int(1));
        table.add(Key::Int(2));
        table.clear();
        assert!(table.is_empty());
        let next = table.add(Key::Int(1));
        assert_eq!(next, SlotIndex::new(2));
    }

    #[test]
    fn flush_and_reload_roundtrip() {
        let driver = MemoryDriver::new();
        let mut table = KeyTable::new();
        table.add(Key::Int(7));
        table.add(Key::Int(9));
        table.flush(&driver, "orders").unwrap();
        assert!(!table.is_dirty());

        let mut fresh = KeyTable::new();
        fresh.reload(&driver, "orders").unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh.get(&Key::Int(7)), table.get(&Key::Int(7)));
        // Counter survives the roundtrip.
        assert_eq!(fresh.add(Key::Int(100)), SlotIndex::new(2));
    }

    #[test]
    fn reload_flushes_pending_changes_first() {
        let driver = MemoryDriver::new();
        let mut table = KeyTable::new();
        table.add(Key::Int(1));
        table.reload(&driver, "t").unwrap();
        assert_eq!(table.get(&Key::Int(1)), Some(SlotIndex::new(0)));
    }

    #[test]
    fn reload_with_no_blob_resets_to_empty() {
        let driver = MemoryDriver::new();
        let mut table = KeyTable::new();
        table.flush(&driver, "t").unwrap(); // nothing dirty, no blob
        table.reload(&driver, "t").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn clean_flush_writes_nothing() {
        let driver = MemoryDriver::new();
        let mut table = KeyTable::new();
        table.flush(&driver, "t").unwrap();
        assert!(driver.load_keys("t").unwrap().is_none());
    }

    #[test]
    fn restore_slot_advances_counter() {
        let mut table = KeyTable::new();
        table.insert_with_slot(Key::Int(1), SlotIndex::new(41));
        assert_eq!(table.add(Key::Int(2)), SlotIndex::new(42));
    }
}
