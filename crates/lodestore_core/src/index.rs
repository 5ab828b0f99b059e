//! Secondary indexes.
//!
//! An index projects each saved instance to one ordered value (or a
//! pair of values) via a caller-supplied extractor. Entries hold at
//! most one value per key: re-saving an instance replaces its entry.
//! Each entry can lazily cache its resolved instance; the catalog
//! fills the cache on first resolution and refresh clears it.

use crate::error::{StoreError, StoreResult};
use crate::types::{Key, Scalar};
use crate::value::{Record, SharedRecord};
use lodestore_codec::{RecordReader, RecordWriter};
use lodestore_driver::StorageDriver;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"LSIX";
const VERSION: u16 = 1;

/// Extracts a single index value from an instance.
pub type SingleExtractor = Arc<dyn Fn(&Record) -> Scalar + Send + Sync>;

/// Extracts a pair of index values from an instance.
pub type DualExtractor = Arc<dyn Fn(&Record) -> (Scalar, Scalar) + Send + Sync>;

/// The extractor backing one index.
#[derive(Clone)]
pub enum Indexer {
    /// Single-column projection.
    Single(SingleExtractor),
    /// Two-column projection, ordered by the first column then the
    /// second.
    Dual(DualExtractor),
}

/// One or two projected columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexValue {
    /// Single column.
    One(Scalar),
    /// Two columns, compared lexicographically.
    Two(Scalar, Scalar),
}

impl IndexValue {
    /// The first (or only) column.
    #[must_use]
    pub fn first(&self) -> &Scalar {
        match self {
            IndexValue::One(a) | IndexValue::Two(a, _) => a,
        }
    }

    /// The second column, if this is a dual index entry.
    #[must_use]
    pub fn second(&self) -> Option<&Scalar> {
        match self {
            IndexValue::One(_) => None,
            IndexValue::Two(_, b) => Some(b),
        }
    }

    fn encode(&self, w: &mut RecordWriter) {
        match self {
            IndexValue::One(a) => {
                w.put_u8(1);
                a.encode(w);
            }
            IndexValue::Two(a, b) => {
                w.put_u8(2);
                a.encode(w);
                b.encode(w);
            }
        }
    }

    fn decode(r: &mut RecordReader<'_>) -> StoreResult<Self> {
        match r.get_u8()? {
            1 => Ok(IndexValue::One(Scalar::decode(r)?)),
            2 => Ok(IndexValue::Two(Scalar::decode(r)?, Scalar::decode(r)?)),
            other => Err(StoreError::invalid_format(format!(
                "unknown index arity: {other}"
            ))),
        }
    }
}

/// One index entry: the projected value, the owning key, and a lazily
/// resolved instance.
#[derive(Debug)]
pub struct IndexEntry {
    value: IndexValue,
    key: Key,
    resolved: Mutex<Option<SharedRecord>>,
}

impl IndexEntry {
    fn new(value: IndexValue, key: Key) -> Self {
        IndexEntry {
            value,
            key,
            resolved: Mutex::new(None),
        }
    }

    /// The projected value.
    #[must_use]
    pub fn value(&self) -> &IndexValue {
        &self.value
    }

    /// The key of the instance this entry points at.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The cached resolved instance, if it has been resolved.
    #[must_use]
    pub fn cached(&self) -> Option<SharedRecord> {
        self.resolved.lock().clone()
    }

    pub(crate) fn fill_cache(&self, instance: &SharedRecord) {
        *self.resolved.lock() = Some(Arc::clone(instance));
    }

    pub(crate) fn invalidate(&self) {
        *self.resolved.lock() = None;
    }
}

/// Secondary index over one table.
pub struct IndexTable {
    name: String,
    indexer: Indexer,
    entries: BTreeMap<Key, Arc<IndexEntry>>,
    dirty: bool,
}

impl IndexTable {
    /// Creates an empty index with the given projection.
    #[must_use]
    pub fn new(name: impl Into<String>, indexer: Indexer) -> Self {
        IndexTable {
            name: name.into(),
            indexer,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// The index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Projects the instance and stores its entry, replacing any
    /// previous entry for the key.
    pub fn add(&mut self, instance: &Record, key: &Key) {
        let value = match &self.indexer {
            Indexer::Single(f) => IndexValue::One(f(instance)),
            Indexer::Dual(f) => {
                let (a, b) = f(instance);
                IndexValue::Two(a, b)
            }
        };
        self.entries
            .insert(key.clone(), Arc::new(IndexEntry::new(value, key.clone())));
        self.dirty = true;
    }

    /// Drops the entry for a key.
    pub fn remove(&mut self, key: &Key) {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.dirty = true;
        }
        self.entries.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by projected value, then key.
    #[must_use]
    pub fn query(&self) -> Vec<Arc<IndexEntry>> {
        let mut hits: Vec<_> = self.entries.values().map(Arc::clone).collect();
        hits.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.key.cmp(&b.key)));
        hits
    }

    /// Clears every entry's resolved-instance cache.
    pub fn invalidate_resolved(&self) {
        for entry in self.entries.values() {
            entry.invalidate();
        }
    }

    /// True if entries changed since the last flush.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.put_blob(MAGIC);
        w.put_u16(VERSION);
        #[allow(clippy::cast_possible_truncation)]
        w.put_u32(self.entries.len() as u32);
        for (key, entry) in &self.entries {
            key.encode(&mut w);
            entry.value.encode(&mut w);
        }
        w.into_bytes()
    }

    fn decode_into(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let mut r = RecordReader::new(bytes);
        if r.get_blob()? != MAGIC {
            return Err(StoreError::invalid_format("bad index magic"));
        }
        let version = r.get_u16()?;
        if version != VERSION {
            return Err(StoreError::invalid_format(format!(
                "unsupported index version: {version}"
            )));
        }
        let count = r.get_u32()? as usize;
        self.entries.clear();
        for _ in 0..count {
            let key = Key::decode(&mut r)?;
            let value = IndexValue::decode(&mut r)?;
            self.entries
                .insert(key.clone(), Arc::new(IndexEntry::new(value, key)));
        }
        self.dirty = false;
        Ok(())
    }

    /// Persists the index through the driver if it is dirty.
    ///
    /// # Errors
    ///
    /// Returns driver errors unchanged.
    pub fn flush(&mut self, driver: &dyn StorageDriver, table: &str) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        driver.save_index(table, &self.name, &self.encode())?;
        self.dirty = false;
        Ok(())
    }

    /// Replaces entries with the driver's copy, flushing pending
    /// changes first. A missing blob resets to empty. Resolved-
    /// instance caches do not survive a reload.
    ///
    /// # Errors
    ///
    /// Returns driver errors and blob corruption unchanged.
    pub fn reload(&mut self, driver: &dyn StorageDriver, table: &str) -> StoreResult<()> {
        self.flush(driver, table)?;
        match driver.load_index(table, &self.name)? {
            Some(bytes) => self.decode_into(&bytes)?,
            None => {
                self.entries.clear();
                self.dirty = false;
            }
        }
        Ok(())
    }
}
