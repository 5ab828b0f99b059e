//! The table catalog.
//!
//! A catalog owns one storage driver and every table registered
//! against it. Its lifecycle has two phases: registration (tables,
//! indexes, schemas) followed by a single [`publish`] call that loads
//! persisted state and opens the catalog for operations. Operating on
//! an unpublished catalog, or registering against a published one, is
//! a misuse error rather than a panic.
//!
//! Each table guards its key and index state with a reentrant timed
//! mutex: recursive saves through foreign references may re-enter the
//! same table on the same thread, while cross-thread contention fails
//! with a timeout instead of deadlocking.
//!
//! [`publish`]: TableCatalog::publish

use crate::cancel::CancelToken;
use crate::codec::{GraphDecoder, GraphEncoder};
use crate::config::Config;
use crate::cycle::CycleCache;
use crate::error::{StoreError, StoreResult};
use crate::events::{CancelNotice, EventBus, EventKind, StoreEvent};
use crate::index::{IndexEntry, IndexTable, Indexer};
use crate::interceptor::{self, ByteInterceptor};
use crate::keytable::KeyTable;
use crate::schema::TableSchema;
use crate::trigger::{TableTrigger, TriggerKind};
use crate::typeindex::TypeIndex;
use crate::types::{Key, Scalar, TypeId};
use crate::value::{Record, SharedRecord, Value};
use lodestore_codec::CodecError;
use lodestore_driver::StorageDriver;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Extracts a table key from an instance.
pub type KeyExtractor = Arc<dyn Fn(&Record) -> Key + Send + Sync>;

/// Decides whether an instance needs writing. A false return makes
/// save a no-op that still yields the key.
pub type DirtyPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Maps a stored member the current schema no longer declares to a
/// current field, or returns `None` to drop it.
pub type PropertyConverter = Arc<dyn Fn(&str, Value) -> Option<(String, Value)> + Send + Sync>;

/// Everything needed to register one table.
pub struct TableRegistration {
    schema: TableSchema,
    key_extractor: KeyExtractor,
    dirty_predicate: Option<DirtyPredicate>,
}

impl TableRegistration {
    /// Starts a registration from a schema and key extractor.
    pub fn new(
        schema: TableSchema,
        key_extractor: impl Fn(&Record) -> Key + Send + Sync + 'static,
    ) -> Self {
        TableRegistration {
            schema,
            key_extractor: Arc::new(key_extractor),
            dirty_predicate: None,
        }
    }

    /// Installs a dirty predicate. Without one every instance is
    /// considered dirty and every save writes.
    #[must_use]
    pub fn dirty_predicate(
        mut self,
        predicate: impl Fn(&Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.dirty_predicate = Some(Arc::new(predicate));
        self
    }
}

#[derive(Default)]
pub(crate) struct TableState {
    pub(crate) keys: KeyTable,
    pub(crate) indexes: BTreeMap<String, IndexTable>,
}

pub(crate) struct TableEntry {
    pub(crate) schema: TableSchema,
    pub(crate) key_extractor: KeyExtractor,
    pub(crate) dirty_predicate: DirtyPredicate,
    // Reentrant so a foreign reference into the same table can be
    // saved inside the parent's critical section; the RefCell borrow
    // is always released before recursing.
    pub(crate) state: ReentrantMutex<RefCell<TableState>>,
    pub(crate) triggers: RwLock<Vec<Arc<dyn TableTrigger>>>,
}

/// Decrements the in-flight counter when an operation ends, however
/// it ends.
struct OpGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> OpGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        OpGuard { counter }
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The engine's front door: registered tables over one storage driver.
pub struct TableCatalog {
    driver: Arc<dyn StorageDriver>,
    config: Config,
    tables: RwLock<HashMap<String, Arc<TableEntry>>>,
    aliases: RwLock<HashMap<String, String>>,
    converters: RwLock<HashMap<String, PropertyConverter>>,
    interceptors: RwLock<Vec<Arc<dyn ByteInterceptor>>>,
    type_index: RwLock<TypeIndex>,
    events: EventBus,
    // Serializes store-wide operations: publish, flush, refresh,
    // purge, backup, restore.
    db_lock: Mutex<()>,
    in_flight: AtomicUsize,
    published: AtomicBool,
}

impl TableCatalog {
    /// Creates an unpublished catalog with default configuration.
    #[must_use]
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        Self::with_config(driver, Config::default())
    }

    /// Creates an unpublished catalog with the given configuration.
    #[must_use]
    pub fn with_config(driver: Arc<dyn StorageDriver>, config: Config) -> Self {
        let events = EventBus::new(config.event_history);
        TableCatalog {
            driver,
            config,
            tables: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            converters: RwLock::new(HashMap::new()),
            interceptors: RwLock::new(Vec::new()),
            type_index: RwLock::new(TypeIndex::new()),
            events,
            db_lock: Mutex::new(()),
            in_flight: AtomicUsize::new(0),
            published: AtomicBool::new(false),
        }
    }

    // ---- registration phase -------------------------------------------------

    /// Registers a table. Registration is only legal before
    /// [`publish`](TableCatalog::publish).
    ///
    /// # Errors
    ///
    /// Fails on a published catalog or a duplicate type name.
    pub fn register(&self, registration: TableRegistration) -> StoreResult<()> {
        self.ensure_unpublished("register")?;
        let type_name = registration.schema.type_name().to_owned();
        let mut tables = self.tables.write();
        if tables.contains_key(&type_name) {
            return Err(StoreError::DuplicateTable { type_name });
        }
        tables.insert(
            type_name.clone(),
            Arc::new(TableEntry {
                schema: registration.schema,
                key_extractor: registration.key_extractor,
                dirty_predicate: registration
                    .dirty_predicate
                    .unwrap_or_else(|| Arc::new(|_| true)),
                state: ReentrantMutex::new(RefCell::new(TableState::default())),
                triggers: RwLock::new(Vec::new()),
            }),
        );
        tracing::debug!(table = %type_name, "table registered");
        Ok(())
    }

    /// Registers a single-column index on a table.
    ///
    /// # Errors
    ///
    /// Fails on a published catalog, an unknown table, or a duplicate
    /// index name.
    pub fn register_index(
        &self,
        type_name: &str,
        index: &str,
        extractor: impl Fn(&Record) -> Scalar + Send + Sync + 'static,
    ) -> StoreResult<()> {
        self.ensure_unpublished("register_index")?;
        self.add_index(type_name, index, Indexer::Single(Arc::new(extractor)))
    }

    /// Registers a two-column index, ordered by the first column then
    /// the second.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`register_index`](TableCatalog::register_index).
    pub fn register_dual_index(
        &self,
        type_name: &str,
        index: &str,
        extractor: impl Fn(&Record) -> (Scalar, Scalar) + Send + Sync + 'static,
    ) -> StoreResult<()> {
        self.ensure_unpublished("register_dual_index")?;
        self.add_index(type_name, index, Indexer::Dual(Arc::new(extractor)))
    }

    fn add_index(&self, type_name: &str, index: &str, indexer: Indexer) -> StoreResult<()> {
        let (table_name, entry) = self.resolve_table(type_name)?;
        let guard = entry.state.lock();
        let mut st = guard.borrow_mut();
        if st.indexes.contains_key(index) {
            return Err(StoreError::DuplicateIndex {
                type_name: table_name,
                index: index.to_owned(),
            });
        }
        st.indexes
            .insert(index.to_owned(), IndexTable::new(index, indexer));
        Ok(())
    }

    /// Makes `alias` resolve to an existing table, so instances whose
    /// type name is the alias persist in that table. The decoded
    /// instance keeps its concrete (alias) type name.
    ///
    /// # Errors
    ///
    /// Fails if the target table is not registered.
    pub fn register_alias(&self, alias: &str, table_type: &str) -> StoreResult<()> {
        if !self.tables.read().contains_key(table_type) {
            return Err(StoreError::table_not_found(table_type));
        }
        self.aliases
            .write()
            .insert(alias.to_owned(), table_type.to_owned());
        Ok(())
    }

    /// Appends a trigger to a table. Triggers run in registration
    /// order and may be added after publish.
    ///
    /// # Errors
    ///
    /// Fails if the table is not registered.
    pub fn register_trigger(
        &self,
        type_name: &str,
        trigger: Arc<dyn TableTrigger>,
    ) -> StoreResult<()> {
        let (_, entry) = self.resolve_table(type_name)?;
        entry.triggers.write().push(trigger);
        Ok(())
    }

    /// Appends a byte interceptor. Interceptors apply to every table:
    /// forward order on save, reverse on load.
    pub fn register_interceptor(&self, interceptor: Arc<dyn ByteInterceptor>) {
        self.interceptors.write().push(interceptor);
    }

    /// Installs the property converter consulted when stored members
    /// no longer match the table's schema.
    ///
    /// # Errors
    ///
    /// Fails if the table is not registered.
    pub fn register_converter(
        &self,
        type_name: &str,
        converter: PropertyConverter,
    ) -> StoreResult<()> {
        let (table_name, _) = self.resolve_table(type_name)?;
        self.converters.write().insert(table_name, converter);
        Ok(())
    }

    /// Ends the registration phase: loads the persisted type index,
    /// key tables, and indexes, then opens the catalog for operations.
    ///
    /// # Errors
    ///
    /// Fails if already published, or on driver/format errors while
    /// loading persisted state.
    pub fn publish(&self) -> StoreResult<()> {
        let _db = self.db_lock.lock();
        if self.published.load(Ordering::SeqCst) {
            return Err(StoreError::misuse("catalog is already published"));
        }
        {
            let mut ti = self.type_index.write();
            if let Some(bytes) = self.driver.load_type_index()? {
                *ti = TypeIndex::decode(&bytes)?;
            }
            self.intern_registered(&mut ti);
        }
        let tables = self.tables.read();
        for (name, entry) in tables.iter() {
            let guard = entry.state.lock();
            let mut st = guard.borrow_mut();
            st.keys.reload(&*self.driver, name)?;
            for idx in st.indexes.values_mut() {
                idx.reload(&*self.driver, name)?;
            }
        }
        self.published.store(true, Ordering::SeqCst);
        tracing::info!(tables = tables.len(), "catalog published");
        Ok(())
    }

    // ---- instance operations ------------------------------------------------

    /// Saves an instance graph, returning the root's key.
    ///
    /// Foreign members are saved recursively into their own tables;
    /// each distinct instance in the graph is written at most once,
    /// even on cycles. A clean instance (per its table's dirty
    /// predicate) yields its key without writing.
    ///
    /// # Errors
    ///
    /// Fails on an unpublished catalog, an unregistered type, a
    /// trigger veto, a lock timeout, or driver/codec failure.
    pub fn save(&self, instance: &SharedRecord) -> StoreResult<Key> {
        self.ensure_published("save")?;
        let _op = OpGuard::new(&self.in_flight);
        let mut cache = CycleCache::new();
        self.save_in_flight(instance, &mut cache)
    }

    pub(crate) fn save_in_flight(
        &self,
        instance: &SharedRecord,
        cache: &mut CycleCache,
    ) -> StoreResult<Key> {
        let type_name = instance.read_recursive().type_name().to_owned();
        let (table_name, entry) = self.resolve_table(&type_name)?;

        let key = (entry.key_extractor)(&instance.read_recursive());
        if cache.check_by_reference(instance) {
            return Ok(cache.key_for(instance).unwrap_or(key));
        }

        if !(entry.dirty_predicate)(&instance.read_recursive()) {
            // Clean: no write, no recursion into members, but the
            // cache entry still terminates cycles through it.
            cache.add(&type_name, instance, Some(&key));
            tracing::trace!(table = %table_name, key = %key, "clean instance skipped");
            return Ok(key);
        }

        for trigger in entry.triggers.read().iter() {
            if !trigger.before_save(instance) {
                return Err(StoreError::TriggerSuppressed {
                    kind: TriggerKind::Save,
                    type_name: table_name,
                });
            }
        }

        let guard = entry
            .state
            .try_lock_for(self.config.operation_timeout)
            .ok_or_else(|| StoreError::timeout("save"))?;

        cache.add(&type_name, instance, Some(&key));
        let slot = {
            let mut st = guard.borrow_mut();
            st.keys.add(key.clone())
        };

        // Encoded with no state borrow held: foreign members re-enter
        // save_in_flight, possibly on this same table.
        let bytes = GraphEncoder { catalog: self }.encode_instance(instance, cache)?;
        let bytes = {
            let chain = self.interceptors.read();
            interceptor::apply_encode(&chain, bytes)
        };
        self.driver.save_instance(&table_name, slot.as_u64(), &bytes)?;

        {
            let mut st = guard.borrow_mut();
            let rec = instance.read_recursive();
            for idx in st.indexes.values_mut() {
                idx.add(&rec, &key);
            }
        }
        drop(guard);

        for trigger in entry.triggers.read().iter() {
            trigger.after_save(instance, &key);
        }
        self.events.emit(EventKind::Saved, &table_name, Some(key.clone()));
        tracing::debug!(table = %table_name, key = %key, slot = %slot, "instance saved");
        Ok(key)
    }

    /// Loads an instance graph by key. `Ok(None)` means the key is
    /// not in the table.
    ///
    /// # Errors
    ///
    /// Fails on an unpublished catalog, an unregistered type, a lock
    /// timeout, or driver/codec failure.
    pub fn load(&self, type_name: &str, key: &Key) -> StoreResult<Option<SharedRecord>> {
        self.ensure_published("load")?;
        let _op = OpGuard::new(&self.in_flight);
        let mut cache = CycleCache::new();
        self.load_in_flight(type_name, key, &mut cache)
    }

    pub(crate) fn load_in_flight(
        &self,
        type_name: &str,
        key: &Key,
        cache: &mut CycleCache,
    ) -> StoreResult<Option<SharedRecord>> {
        let (table_name, entry) = self.resolve_table(type_name)?;
        // The decoder caches under the embedded concrete type name,
        // which for aliased instances differs from the table name;
        // check both.
        if let Some(hit) = cache
            .check_by_key(type_name, key)
            .or_else(|| cache.check_by_key(&table_name, key))
        {
            return Ok(Some(hit));
        }

        let slot = {
            let guard = entry
                .state
                .try_lock_for(self.config.operation_timeout)
                .ok_or_else(|| StoreError::timeout("load"))?;
            let st = guard.borrow();
            st.keys.get(key)
        };
        let Some(slot) = slot else {
            return Ok(None);
        };

        let bytes = self.driver.load_instance(&table_name, slot.as_u64())?;
        let bytes = {
            let chain = self.interceptors.read();
            interceptor::apply_decode(&chain, bytes)
        };
        let decoded = GraphDecoder { catalog: self }.decode_instance(key, &bytes, cache)?;
        if decoded.is_some() {
            self.events
                .emit(EventKind::Loaded, &table_name, Some(key.clone()));
        }
        Ok(decoded)
    }

    /// Deletes a key. Deleting an absent key is a no-op; triggers
    /// still run first and may veto.
    ///
    /// # Errors
    ///
    /// Fails on an unpublished catalog, an unregistered type, a
    /// trigger veto, a lock timeout, or driver failure.
    pub fn delete(&self, type_name: &str, key: &Key) -> StoreResult<()> {
        self.ensure_published("delete")?;
        let _op = OpGuard::new(&self.in_flight);
        let (table_name, entry) = self.resolve_table(type_name)?;

        for trigger in entry.triggers.read().iter() {
            if !trigger.before_delete(key) {
                return Err(StoreError::TriggerSuppressed {
                    kind: TriggerKind::Delete,
                    type_name: table_name,
                });
            }
        }

        let removed = {
            let guard = entry
                .state
                .try_lock_for(self.config.operation_timeout)
                .ok_or_else(|| StoreError::timeout("delete"))?;
            let mut st = guard.borrow_mut();
            let slot = st.keys.remove(key);
            if slot.is_some() {
                for idx in st.indexes.values_mut() {
                    idx.remove(key);
                }
            }
            slot
        };

        if let Some(slot) = removed {
            self.driver.delete_instance(&table_name, slot.as_u64())?;
            self.events
                .emit(EventKind::Deleted, &table_name, Some(key.clone()));
            tracing::debug!(table = %table_name, key = %key, "instance deleted");
        }
        Ok(())
    }

    /// Number of live keys in a table.
    ///
    /// # Errors
    ///
    /// Fails on an unpublished catalog, an unregistered type, or a
    /// lock timeout.
    pub fn count(&self, type_name: &str) -> StoreResult<usize> {
        self.ensure_published("count")?;
        let (_, entry) = self.resolve_table(type_name)?;
        let guard = entry
            .state
            .try_lock_for(self.config.operation_timeout)
            .ok_or_else(|| StoreError::timeout("count"))?;
        let st = guard.borrow();
        Ok(st.keys.len())
    }

    /// Snapshot of a table's live keys, in key order.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`count`](TableCatalog::count).
    pub fn keys(&self, type_name: &str) -> StoreResult<Vec<Key>> {
        self.ensure_published("keys")?;
        let (_, entry) = self.resolve_table(type_name)?;
        let guard = entry
            .state
            .try_lock_for(self.config.operation_timeout)
            .ok_or_else(|| StoreError::timeout("keys"))?;
        let st = guard.borrow();
        Ok(st.keys.keys().cloned().collect())
    }

    // ---- index queries ------------------------------------------------------

    /// All entries of an index, ordered by projected value then key.
    ///
    /// # Errors
    ///
    /// Fails on an unpublished catalog, an unregistered type, an
    /// unknown index, or a lock timeout.
    pub fn query(&self, type_name: &str, index: &str) -> StoreResult<Vec<Arc<IndexEntry>>> {
        self.ensure_published("query")?;
        let _op = OpGuard::new(&self.in_flight);
        let (table_name, entry) = self.resolve_table(type_name)?;
        let guard = entry
            .state
            .try_lock_for(self.config.operation_timeout)
            .ok_or_else(|| StoreError::timeout("query"))?;
        let st = guard.borrow();
        let idx = st.indexes.get(index).ok_or_else(|| StoreError::IndexNotFound {
            type_name: table_name,
            index: index.to_owned(),
        })?;
        Ok(idx.query())
    }

    /// Resolves an index entry to its instance, caching the result on
    /// the entry. The cache survives until the next
    /// [`refresh`](TableCatalog::refresh).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`load`](TableCatalog::load).
    pub fn resolve_entry(
        &self,
        type_name: &str,
        entry: &IndexEntry,
    ) -> StoreResult<Option<SharedRecord>> {
        if let Some(hit) = entry.cached() {
            return Ok(Some(hit));
        }
        let loaded = self.load(type_name, entry.key())?;
        if let Some(instance) = &loaded {
            entry.fill_cache(instance);
        }
        Ok(loaded)
    }

    // ---- batch operations ---------------------------------------------------

    /// Saves a batch of instances, checking the token between
    /// instances. Instances saved before cancellation stay saved.
    ///
    /// # Errors
    ///
    /// Fails with a cancellation error once the token trips, plus the
    /// failure modes of [`save`](TableCatalog::save).
    pub fn save_all(
        &self,
        instances: &[SharedRecord],
        token: &CancelToken,
    ) -> StoreResult<Vec<Key>> {
        let mut keys = Vec::with_capacity(instances.len());
        for instance in instances {
            if token.is_canceled() {
                self.events.emit_canceled("save_all");
                return Err(StoreError::canceled("save_all"));
            }
            keys.push(self.save(instance)?);
        }
        Ok(keys)
    }

    /// Loads every instance of a table, checking the token between
    /// keys.
    ///
    /// # Errors
    ///
    /// Fails with a cancellation error once the token trips, plus the
    /// failure modes of [`load`](TableCatalog::load).
    pub fn load_all(
        &self,
        type_name: &str,
        token: &CancelToken,
    ) -> StoreResult<Vec<SharedRecord>> {
        let keys = self.keys(type_name)?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if token.is_canceled() {
                self.events.emit_canceled("load_all");
                return Err(StoreError::canceled("load_all"));
            }
            if let Some(instance) = self.load(type_name, &key)? {
                out.push(instance);
            }
        }
        Ok(out)
    }

    /// Deletes a batch of keys from one table, checking the token
    /// between keys. Keys deleted before cancellation stay deleted.
    ///
    /// # Errors
    ///
    /// Fails with a cancellation error once the token trips, plus the
    /// failure modes of [`delete`](TableCatalog::delete).
    pub fn delete_all(
        &self,
        type_name: &str,
        keys: &[Key],
        token: &CancelToken,
    ) -> StoreResult<()> {
        for key in keys {
            if token.is_canceled() {
                self.events.emit_canceled("delete_all");
                return Err(StoreError::canceled("delete_all"));
            }
            self.delete(type_name, key)?;
        }
        Ok(())
    }

    // ---- maintenance --------------------------------------------------------

    /// Empties one table: driver records, keys, and indexes. The slot
    /// counter is preserved, so post-truncate saves get fresh slots.
    ///
    /// # Errors
    ///
    /// Fails with a busy error if any operation is in flight, plus
    /// lock timeout and driver failures.
    pub fn truncate(&self, type_name: &str) -> StoreResult<()> {
        self.ensure_published("truncate")?;
        self.ensure_idle()?;
        let (table_name, entry) = self.resolve_table(type_name)?;
        let guard = entry
            .state
            .try_lock_for(self.config.operation_timeout)
            .ok_or_else(|| StoreError::timeout("truncate"))?;
        {
            let mut st = guard.borrow_mut();
            self.driver.truncate(&table_name)?;
            st.keys.clear();
            st.keys.flush(&*self.driver, &table_name)?;
            for idx in st.indexes.values_mut() {
                idx.clear();
                idx.flush(&*self.driver, &table_name)?;
            }
        }
        drop(guard);
        self.events.emit(EventKind::Truncated, &table_name, None);
        tracing::info!(table = %table_name, "table truncated");
        Ok(())
    }

    /// Empties every table and resets the type index to its seeds
    /// plus the registered type names.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`truncate`](TableCatalog::truncate).
    pub fn purge(&self) -> StoreResult<()> {
        self.ensure_published("purge")?;
        self.ensure_idle()?;
        let _db = self.db_lock.lock();
        let tables = self.tables.read();
        for entry in tables.values() {
            let guard = entry
                .state
                .try_lock_for(self.config.operation_timeout)
                .ok_or_else(|| StoreError::timeout("purge"))?;
            let mut st = guard.borrow_mut();
            st.keys.clear();
            for idx in st.indexes.values_mut() {
                idx.clear();
            }
        }
        self.driver.purge()?;
        {
            let mut ti = self.type_index.write();
            *ti = TypeIndex::new();
            self.intern_registered_locked(&tables, &mut ti);
            self.driver.save_type_index(&ti.encode())?;
            ti.mark_clean();
        }
        for (name, entry) in tables.iter() {
            let guard = entry.state.lock();
            let mut st = guard.borrow_mut();
            st.keys.flush(&*self.driver, name)?;
            for idx in st.indexes.values_mut() {
                idx.flush(&*self.driver, name)?;
            }
        }
        self.events.emit(EventKind::Purged, "", None);
        tracing::info!("store purged");
        Ok(())
    }

    /// Persists every dirty key table, index, and the type index.
    ///
    /// # Errors
    ///
    /// Fails on lock timeout or driver failure.
    pub fn flush(&self) -> StoreResult<()> {
        self.ensure_published("flush")?;
        let _db = self.db_lock.lock();
        self.flush_type_index()?;
        for (name, entry) in self.tables.read().iter() {
            let guard = entry
                .state
                .try_lock_for(self.config.operation_timeout)
                .ok_or_else(|| StoreError::timeout("flush"))?;
            let mut st = guard.borrow_mut();
            st.keys.flush(&*self.driver, name)?;
            for idx in st.indexes.values_mut() {
                idx.flush(&*self.driver, name)?;
            }
        }
        Ok(())
    }

    /// Discards in-memory table state in favor of the driver's copy,
    /// flushing pending changes first. Resolved-instance caches on
    /// index entries are invalidated.
    ///
    /// # Errors
    ///
    /// Fails on lock timeout, driver failure, or blob corruption.
    pub fn refresh(&self) -> StoreResult<()> {
        self.ensure_published("refresh")?;
        let _db = self.db_lock.lock();
        self.flush_type_index()?;
        {
            let mut ti = self.type_index.write();
            if let Some(bytes) = self.driver.load_type_index()? {
                *ti = TypeIndex::decode(&bytes)?;
            }
            self.intern_registered(&mut ti);
        }
        for (name, entry) in self.tables.read().iter() {
            let guard = entry
                .state
                .try_lock_for(self.config.operation_timeout)
                .ok_or_else(|| StoreError::timeout("refresh"))?;
            let mut st = guard.borrow_mut();
            st.keys.reload(&*self.driver, name)?;
            for idx in st.indexes.values_mut() {
                idx.reload(&*self.driver, name)?;
                idx.invalidate_resolved();
            }
        }
        Ok(())
    }

    // ---- events -------------------------------------------------------------

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Subscribes to batch-cancellation notices.
    pub fn subscribe_canceled(&self) -> Receiver<CancelNotice> {
        self.events.subscribe_canceled()
    }

    /// Cursor-based event polling; see [`EventBus::poll`].
    #[must_use]
    pub fn poll_events(&self, cursor: u64, limit: usize) -> Vec<StoreEvent> {
        self.events.poll(cursor, limit)
    }

    /// The sequence number of the most recent event.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.events.latest_sequence()
    }

    // ---- internals ----------------------------------------------------------

    pub(crate) fn driver(&self) -> &dyn StorageDriver {
        &*self.driver
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn db_lock(&self) -> &Mutex<()> {
        &self.db_lock
    }

    pub(crate) fn tables(&self) -> &RwLock<HashMap<String, Arc<TableEntry>>> {
        &self.tables
    }

    pub(crate) fn type_index(&self) -> &RwLock<TypeIndex> {
        &self.type_index
    }

    pub(crate) fn ensure_published(&self, operation: &str) -> StoreResult<()> {
        if self.published.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::misuse(format!(
                "'{operation}' requires a published catalog"
            )))
        }
    }

    fn ensure_unpublished(&self, operation: &str) -> StoreResult<()> {
        if self.published.load(Ordering::SeqCst) {
            Err(StoreError::misuse(format!(
                "'{operation}' is only legal before publish"
            )))
        } else {
            Ok(())
        }
    }

    pub(crate) fn ensure_idle(&self) -> StoreResult<()> {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        if in_flight > 0 {
            return Err(StoreError::Busy { in_flight });
        }
        Ok(())
    }

    /// Resolves a type name to its table, following one alias hop.
    pub(crate) fn resolve_table(&self, type_name: &str) -> StoreResult<(String, Arc<TableEntry>)> {
        let tables = self.tables.read();
        if let Some(entry) = tables.get(type_name) {
            return Ok((type_name.to_owned(), Arc::clone(entry)));
        }
        let target = self.aliases.read().get(type_name).cloned();
        if let Some(target) = target {
            if let Some(entry) = tables.get(&target) {
                return Ok((target, Arc::clone(entry)));
            }
        }
        Err(StoreError::table_not_found(type_name))
    }

    pub(crate) fn is_table_type(&self, name: &str) -> bool {
        self.tables.read().contains_key(name) || self.aliases.read().contains_key(name)
    }

    /// The schema governing instances of `name`, if it is (or aliases
    /// to) a table type.
    pub(crate) fn schema_of(&self, name: &str) -> Option<TableSchema> {
        let tables = self.tables.read();
        if let Some(entry) = tables.get(name) {
            return Some(entry.schema.clone());
        }
        let target = self.aliases.read().get(name).cloned()?;
        tables.get(&target).map(|e| e.schema.clone())
    }

    /// Returns the wire id for a type name, interning it on first use.
    pub(crate) fn type_id_for(&self, name: &str) -> TypeId {
        if let Some(id) = self.type_index.read().get(name) {
            return id;
        }
        self.type_index.write().intern(name)
    }

    pub(crate) fn resolve_type_name(&self, id: TypeId) -> StoreResult<String> {
        self.type_index
            .read()
            .resolve(id)
            .map(str::to_owned)
            .ok_or_else(|| StoreError::Codec(CodecError::UnknownTypeId(id.as_i32())))
    }

    pub(crate) fn converter_for(&self, name: &str) -> Option<PropertyConverter> {
        self.converters.read().get(name).cloned()
    }

    /// Decodes raw stored bytes through the interceptor chain and the
    /// graph decoder. Used by maintenance paths that bypass `load`.
    pub(crate) fn decode_stored(
        &self,
        key: &Key,
        bytes: Vec<u8>,
        cache: &mut CycleCache,
    ) -> StoreResult<Option<SharedRecord>> {
        let bytes = {
            let chain = self.interceptors.read();
            interceptor::apply_decode(&chain, bytes)
        };
        GraphDecoder { catalog: self }.decode_instance(key, &bytes, cache)
    }

    fn flush_type_index(&self) -> StoreResult<()> {
        let mut ti = self.type_index.write();
        if ti.is_dirty() {
            self.driver.save_type_index(&ti.encode())?;
            ti.mark_clean();
        }
        Ok(())
    }

    pub(crate) fn intern_registered(&self, ti: &mut TypeIndex) {
        let tables = self.tables.read();
        self.intern_registered_locked(&tables, ti);
    }

    // Interning order must be deterministic: two catalogs with the
    // same registrations have to assign identical ids, or bytes saved
    // by one would decode with the wrong type names in the other.
    fn intern_registered_locked(
        &self,
        tables: &HashMap<String, Arc<TableEntry>>,
        ti: &mut TypeIndex,
    ) {
        let mut table_names: Vec<&String> = tables.keys().collect();
        table_names.sort();
        let mut names = Vec::new();
        for name in table_names {
            ti.intern(name);
            for field in tables[name.as_str()].schema.fields() {
                field.kind.referenced_names(&mut names);
            }
        }
        let mut aliases: Vec<String> = self.aliases.read().keys().cloned().collect();
        aliases.sort();
        for alias in aliases {
            ti.intern(&alias);
        }
        for name in names {
            ti.intern(&name);
        }
    }
}

impl Drop for TableCatalog {
    fn drop(&mut self) {
        if self.published.load(Ordering::SeqCst) {
            if let Err(err) = self.flush() {
                tracing::warn!(%err, "flush on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use lodestore_codec::PrimitiveKind;
    use lodestore_driver::MemoryDriver;
    use std::sync::atomic::AtomicUsize;

    fn user_schema() -> TableSchema {
        TableSchema::new("app::User")
            .field("id", FieldKind::Primitive(PrimitiveKind::I64))
            .field("name", FieldKind::Primitive(PrimitiveKind::Text))
    }

    fn user_key(rec: &Record) -> Key {
        Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
    }

    fn user(id: i64, name: &str) -> SharedRecord {
        Record::shared(
            Record::new("app::User")
                .with("id", Value::int(id))
                .with("name", Value::text(name)),
        )
    }

    fn open_users() -> TableCatalog {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog.publish().unwrap();
        catalog
    }

    #[test]
    fn operations_require_publish() {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        let err = catalog.save(&user(1, "ada")).unwrap_err();
        assert!(matches!(err, StoreError::ActivationMisuse { .. }));
    }

    #[test]
    fn registration_requires_unpublished() {
        let catalog = open_users();
        let err = catalog
            .register(TableRegistration::new(
                TableSchema::new("app::Other"),
                user_key,
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::ActivationMisuse { .. }));
    }

    #[test]
    fn double_publish_rejected() {
        let catalog = open_users();
        assert!(matches!(
            catalog.publish(),
            Err(StoreError::ActivationMisuse { .. })
        ));
    }

    #[test]
    fn duplicate_table_rejected() {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        assert!(matches!(
            catalog.register(TableRegistration::new(user_schema(), user_key)),
            Err(StoreError::DuplicateTable { .. })
        ));
    }

    #[test]
    fn duplicate_index_rejected() {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog
            .register_index("app::User", "by_name", |rec| {
                Scalar::Text(rec.get("name").and_then(Value::as_text).unwrap_or("").into())
            })
            .unwrap();
        let err = catalog
            .register_index("app::User", "by_name", |_| Scalar::Int(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIndex { .. }));
    }

    #[test]
    fn save_load_roundtrip() {
        let catalog = open_users();
        let key = catalog.save(&user(7, "ada")).unwrap();
        assert_eq!(key, Key::Int(7));

        let loaded = catalog.load("app::User", &key).unwrap().unwrap();
        let rec = loaded.read();
        assert_eq!(rec.type_name(), "app::User");
        assert_eq!(rec.get("name").and_then(Value::as_text), Some("ada"));
        assert_eq!(rec.get("id").and_then(Value::as_int), Some(7));
    }

    #[test]
    fn load_absent_key_is_none() {
        let catalog = open_users();
        assert!(catalog.load("app::User", &Key::Int(404)).unwrap().is_none());
    }

    #[test]
    fn unregistered_type_errors() {
        let catalog = open_users();
        assert!(matches!(
            catalog.load("app::Ghost", &Key::Int(1)),
            Err(StoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn delete_removes_key_and_absent_delete_is_noop() {
        let catalog = open_users();
        let key = catalog.save(&user(1, "ada")).unwrap();
        catalog.delete("app::User", &key).unwrap();
        assert!(catalog.load("app::User", &key).unwrap().is_none());
        assert_eq!(catalog.count("app::User").unwrap(), 0);

        catalog.delete("app::User", &Key::Int(999)).unwrap();
    }

    #[test]
    fn dirty_predicate_skips_clean_instances() {
        let driver = Arc::new(MemoryDriver::new());
        let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(
                TableRegistration::new(user_schema(), user_key).dirty_predicate(|rec| {
                    rec.get("name").and_then(Value::as_text) != Some("clean")
                }),
            )
            .unwrap();
        catalog.publish().unwrap();

        let key = catalog.save(&user(1, "clean")).unwrap();
        assert_eq!(key, Key::Int(1));
        assert_eq!(driver.instance_count(), 0);
        assert_eq!(catalog.count("app::User").unwrap(), 0);

        catalog.save(&user(2, "dirty")).unwrap();
        assert_eq!(driver.instance_count(), 1);
    }

    #[test]
    fn trigger_veto_aborts_save_before_any_write() {
        struct Veto;
        impl TableTrigger for Veto {
            fn before_save(&self, _: &SharedRecord) -> bool {
                false
            }
        }
        let driver = Arc::new(MemoryDriver::new());
        let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog.publish().unwrap();
        catalog
            .register_trigger("app::User", Arc::new(Veto))
            .unwrap();

        let err = catalog.save(&user(1, "ada")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::TriggerSuppressed {
                kind: TriggerKind::Save,
                ..
            }
        ));
        assert_eq!(driver.instance_count(), 0);
        assert_eq!(catalog.count("app::User").unwrap(), 0);
    }

    #[test]
    fn trigger_veto_aborts_delete() {
        struct NoDelete;
        impl TableTrigger for NoDelete {
            fn before_delete(&self, _: &Key) -> bool {
                false
            }
        }
        let catalog = open_users();
        let key = catalog.save(&user(1, "ada")).unwrap();
        catalog
            .register_trigger("app::User", Arc::new(NoDelete))
            .unwrap();
        assert!(matches!(
            catalog.delete("app::User", &key),
            Err(StoreError::TriggerSuppressed {
                kind: TriggerKind::Delete,
                ..
            })
        ));
        assert!(catalog.load("app::User", &key).unwrap().is_some());
    }

    #[test]
    fn after_save_fires_with_key() {
        struct Count(AtomicUsize);
        impl TableTrigger for Count {
            fn after_save(&self, _: &SharedRecord, key: &Key) {
                assert_eq!(key, &Key::Int(5));
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let catalog = open_users();
        let counter = Arc::new(Count(AtomicUsize::new(0)));
        catalog
            .register_trigger("app::User", Arc::clone(&counter) as Arc<dyn TableTrigger>)
            .unwrap();
        catalog.save(&user(5, "ada")).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn index_query_and_lazy_resolution() {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog
            .register_index("app::User", "by_name", |rec| {
                Scalar::Text(rec.get("name").and_then(Value::as_text).unwrap_or("").into())
            })
            .unwrap();
        catalog.publish().unwrap();

        catalog.save(&user(1, "zoe")).unwrap();
        catalog.save(&user(2, "ada")).unwrap();

        let hits = catalog.query("app::User", "by_name").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key(), &Key::Int(2));
        assert!(hits[0].cached().is_none());

        let resolved = catalog
            .resolve_entry("app::User", &hits[0])
            .unwrap()
            .unwrap();
        assert_eq!(
            resolved.read().get("name").and_then(Value::as_text),
            Some("ada")
        );
        assert!(hits[0].cached().is_some());
    }

    #[test]
    fn unknown_index_errors() {
        let catalog = open_users();
        assert!(matches!(
            catalog.query("app::User", "nope"),
            Err(StoreError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn truncate_preserves_slot_counter() {
        let driver = Arc::new(MemoryDriver::new());
        let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog.publish().unwrap();

        catalog.save(&user(1, "a")).unwrap();
        catalog.save(&user(2, "b")).unwrap();
        catalog.truncate("app::User").unwrap();
        assert_eq!(catalog.count("app::User").unwrap(), 0);
        assert_eq!(driver.instance_count(), 0);

        // New saves land in fresh slots past the retired ones.
        catalog.save(&user(3, "c")).unwrap();
        let loaded = catalog.load("app::User", &Key::Int(3)).unwrap().unwrap();
        assert_eq!(loaded.read().get("id").and_then(Value::as_int), Some(3));
    }

    #[test]
    fn flush_and_reopen_preserves_state() {
        let driver = Arc::new(MemoryDriver::new());
        {
            let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
            catalog
                .register(TableRegistration::new(user_schema(), user_key))
                .unwrap();
            catalog.publish().unwrap();
            catalog.save(&user(9, "ada")).unwrap();
            catalog.flush().unwrap();
        }
        let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog.publish().unwrap();
        let loaded = catalog.load("app::User", &Key::Int(9)).unwrap().unwrap();
        assert_eq!(
            loaded.read().get("name").and_then(Value::as_text),
            Some("ada")
        );
    }

    #[test]
    fn alias_saves_into_target_table() {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog
            .register_alias("app::AdminUser", "app::User")
            .unwrap();
        catalog.publish().unwrap();

        let admin = Record::shared(
            Record::new("app::AdminUser")
                .with("id", Value::int(1))
                .with("name", Value::text("root")),
        );
        catalog.save(&admin).unwrap();
        assert_eq!(catalog.count("app::User").unwrap(), 1);

        // Loading through either name works; the concrete type comes
        // back from the stored type id.
        let via_alias = catalog
            .load("app::AdminUser", &Key::Int(1))
            .unwrap()
            .unwrap();
        assert_eq!(via_alias.read().type_name(), "app::AdminUser");
        let via_table = catalog.load("app::User", &Key::Int(1)).unwrap().unwrap();
        assert_eq!(via_table.read().type_name(), "app::AdminUser");
    }

    #[test]
    fn alias_to_missing_table_rejected() {
        let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
        assert!(matches!(
            catalog.register_alias("a", "missing"),
            Err(StoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn events_carry_sequence_and_key() {
        let catalog = open_users();
        let rx = catalog.subscribe();
        let key = catalog.save(&user(1, "ada")).unwrap();
        catalog.delete("app::User", &key).unwrap();

        let saved = rx.try_recv().unwrap();
        assert_eq!(saved.kind, EventKind::Saved);
        assert_eq!(saved.key, Some(Key::Int(1)));
        let deleted = rx.try_recv().unwrap();
        assert_eq!(deleted.kind, EventKind::Deleted);
        assert!(deleted.sequence > saved.sequence);
    }

    #[test]
    fn canceled_batch_stops_and_notifies() {
        let catalog = open_users();
        let cancels = catalog.subscribe_canceled();
        let token = CancelToken::new();
        token.cancel();
        let err = catalog
            .save_all(&[user(1, "a"), user(2, "b")], &token)
            .unwrap_err();
        assert!(matches!(err, StoreError::Canceled { .. }));
        assert_eq!(cancels.try_recv().unwrap().operation, "save_all");
        assert_eq!(catalog.count("app::User").unwrap(), 0);
    }

    #[test]
    fn save_all_and_load_all_roundtrip() {
        let catalog = open_users();
        let token = CancelToken::new();
        let keys = catalog
            .save_all(&[user(1, "a"), user(2, "b"), user(3, "c")], &token)
            .unwrap();
        assert_eq!(keys, vec![Key::Int(1), Key::Int(2), Key::Int(3)]);
        let all = catalog.load_all("app::User", &token).unwrap();
        assert_eq!(all.len(), 3);

        catalog
            .delete_all("app::User", &keys[..2], &token)
            .unwrap();
        assert_eq!(catalog.count("app::User").unwrap(), 1);
    }

    #[test]
    fn interceptors_transform_stored_bytes() {
        use crate::interceptor::XorInterceptor;
        let driver = Arc::new(MemoryDriver::new());
        let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(TableRegistration::new(user_schema(), user_key))
            .unwrap();
        catalog.register_interceptor(Arc::new(XorInterceptor::new(0x5C)));
        catalog.publish().unwrap();

        let key = catalog.save(&user(1, "ada")).unwrap();
        let loaded = catalog.load("app::User", &key).unwrap().unwrap();
        assert_eq!(
            loaded.read().get("name").and_then(Value::as_text),
            Some("ada")
        );
    }
}
