//! Backup and restore.
//!
//! A backup is one self-contained byte stream: header, the type index
//! blob, then every table's keys, slots, and raw stored instance
//! bytes, closed by a SHA-256 digest of everything before it. Instance
//! bytes are copied as stored (interceptor output included), so a
//! backup restores bit-identically through the same interceptor chain.
//!
//! Restore is destructive: it replaces the type index and the full
//! contents of every table named in the stream, then rebuilds indexes
//! from the restored instances. Ids embedded in instance payloads
//! reference the type index captured alongside them, which is why the
//! two always travel together.

use crate::catalog::TableCatalog;
use crate::cycle::CycleCache;
use crate::error::{StoreError, StoreResult};
use crate::types::{Key, SlotIndex};
use crate::typeindex::TypeIndex;
use chrono::Utc;
use lodestore_codec::{RecordReader, RecordWriter};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const MAGIC: &[u8; 4] = b"LSBK";
const VERSION: u16 = 1;
const DIGEST_LEN: usize = 32;

/// Header fields of a validated backup stream.
#[derive(Debug, Clone)]
pub struct BackupMetadata {
    /// Random id minted when the backup was taken.
    pub backup_id: Uuid,
    /// When the backup was taken, UTC milliseconds.
    pub timestamp_millis: i64,
    /// Number of tables captured.
    pub table_count: u32,
}

/// What a restore actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Tables found in the stream and restored.
    pub tables_restored: u32,
    /// Tables found in the stream but skipped because no matching
    /// table is registered.
    pub tables_skipped: u32,
    /// Instances written back.
    pub instances_restored: u64,
}

impl TableCatalog {
    /// Captures the whole store into one backup stream.
    ///
    /// # Errors
    ///
    /// Fails on an unpublished catalog, lock timeout, or driver
    /// failure.
    pub fn backup(&self) -> StoreResult<Vec<u8>> {
        self.ensure_published("backup")?;
        let _db = self.db_lock().lock();

        let mut w = RecordWriter::new();
        w.put_blob(MAGIC);
        w.put_u16(VERSION);
        let backup_id = Uuid::new_v4();
        w.put_blob(backup_id.as_bytes());
        w.put_i64(Utc::now().timestamp_millis());
        w.put_blob(&self.type_index().read().encode());

        let tables = self.tables().read();
        #[allow(clippy::cast_possible_truncation)]
        w.put_u32(tables.len() as u32);
        let mut names: Vec<&String> = tables.keys().collect();
        names.sort();
        for name in names {
            let entry = &tables[name.as_str()];
            let guard = entry
                .state
                .try_lock_for(self.config().operation_timeout)
                .ok_or_else(|| StoreError::timeout("backup"))?;
            let st = guard.borrow();
            w.put_string(name);
            #[allow(clippy::cast_possible_truncation)]
            w.put_u32(st.keys.len() as u32);
            for (key, slot) in st.keys.iter() {
                key.encode(&mut w);
                w.put_u64(slot.as_u64());
                let bytes = self.driver().load_instance(name, slot.as_u64())?;
                w.put_blob(&bytes);
            }
        }

        let mut out = w.into_bytes();
        let digest = Sha256::digest(&out);
        out.extend_from_slice(&digest);
        tracing::info!(backup_id = %backup_id, bytes = out.len(), "backup captured");
        Ok(out)
    }

    /// Verifies a stream's digest and reads its header without
    /// touching the store.
    ///
    /// # Errors
    ///
    /// Fails on truncation, digest mismatch, bad magic, or an
    /// unsupported version.
    pub fn validate_backup(bytes: &[u8]) -> StoreResult<BackupMetadata> {
        if bytes.len() < DIGEST_LEN {
            return Err(StoreError::invalid_format("backup stream too short"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - DIGEST_LEN);
        if Sha256::digest(body).as_slice() != trailer {
            return Err(StoreError::invalid_format("backup digest mismatch"));
        }
        let mut r = RecordReader::new(body);
        if r.get_blob()? != MAGIC {
            return Err(StoreError::invalid_format("bad backup magic"));
        }
        let version = r.get_u16()?;
        if version != VERSION {
            return Err(StoreError::invalid_format(format!(
                "unsupported backup version: {version}"
            )));
        }
        let id_bytes = r.get_blob()?;
        let arr: [u8; 16] = id_bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::invalid_format("backup id is not 16 bytes"))?;
        let timestamp_millis = r.get_i64()?;
        let _type_blob = r.get_blob()?;
        let table_count = r.get_u32()?;
        Ok(BackupMetadata {
            backup_id: Uuid::from_bytes(arr),
            timestamp_millis,
            table_count,
        })
    }

    /// Replaces store contents with a backup stream.
    ///
    /// Tables in the stream without a registered counterpart are
    /// skipped (and counted in the stats); registered tables absent
    /// from the stream keep their current contents.
    ///
    /// # Errors
    ///
    /// Fails on validation failure, a busy store, lock timeout, or
    /// driver failure.
    pub fn restore(&self, bytes: &[u8]) -> StoreResult<RestoreStats> {
        self.ensure_published("restore")?;
        Self::validate_backup(bytes)?;
        self.ensure_idle()?;
        let _db = self.db_lock().lock();

        let body = &bytes[..bytes.len() - DIGEST_LEN];
        let mut r = RecordReader::new(body);
        let _magic = r.get_blob()?;
        let _version = r.get_u16()?;
        let _backup_id = r.get_blob()?;
        let _timestamp = r.get_i64()?;
        let type_blob = r.get_blob()?;
        {
            let mut ti = self.type_index().write();
            *ti = TypeIndex::decode(&type_blob)?;
            self.intern_registered(&mut ti);
            self.driver().save_type_index(&ti.encode())?;
            ti.mark_clean();
        }

        let table_count = r.get_u32()?;
        let mut stats = RestoreStats::default();
        let mut restored = Vec::new();
        for _ in 0..table_count {
            let name = r.get_string()?;
            let key_count = r.get_u32()?;
            let entry = self.tables().read().get(&name).cloned();
            match entry {
                Some(entry) => {
                    let guard = entry.state.lock();
                    let mut st = guard.borrow_mut();
                    self.driver().truncate(&name)?;
                    st.keys.clear();
                    for idx in st.indexes.values_mut() {
                        idx.clear();
                    }
                    for _ in 0..key_count {
                        let key = Key::decode(&mut r)?;
                        let slot = SlotIndex::new(r.get_u64()?);
                        let blob = r.get_blob()?;
                        self.driver().save_instance(&name, slot.as_u64(), &blob)?;
                        st.keys.insert_with_slot(key, slot);
                        stats.instances_restored += 1;
                    }
                    st.keys.flush(self.driver(), &name)?;
                    stats.tables_restored += 1;
                    restored.push(name);
                }
                None => {
                    // Consume the stream entries so the reader stays
                    // aligned for the next table.
                    for _ in 0..key_count {
                        let _key = Key::decode(&mut r)?;
                        let _slot = r.get_u64()?;
                        let _blob = r.get_blob()?;
                    }
                    stats.tables_skipped += 1;
                    tracing::warn!(table = %name, "skipping backup table with no registered counterpart");
                }
            }
        }

        // Second pass, after every table's bytes are in place, so
        // foreign references resolve against restored data when the
        // extractors need them.
        for name in &restored {
            self.rebuild_indexes(name)?;
        }
        tracing::info!(
            tables = stats.tables_restored,
            instances = stats.instances_restored,
            "restore complete"
        );
        Ok(stats)
    }

    fn rebuild_indexes(&self, table: &str) -> StoreResult<()> {
        let (table_name, entry) = self.resolve_table(table)?;
        let has_indexes = {
            let guard = entry.state.lock();
            let st = guard.borrow();
            !st.indexes.is_empty()
        };
        if !has_indexes {
            return Ok(());
        }
        let keyed: Vec<(Key, u64)> = {
            let guard = entry.state.lock();
            let st = guard.borrow();
            st.keys.iter().map(|(k, s)| (k.clone(), s.as_u64())).collect()
        };
        for (key, slot) in keyed {
            let bytes = self.driver().load_instance(&table_name, slot)?;
            let mut cache = CycleCache::new();
            if let Some(instance) = self.decode_stored(&key, bytes, &mut cache)? {
                let guard = entry.state.lock();
                let mut st = guard.borrow_mut();
                let rec = instance.read_recursive();
                for idx in st.indexes.values_mut() {
                    idx.add(&rec, &key);
                }
            }
        }
        let guard = entry.state.lock();
        let mut st = guard.borrow_mut();
        for idx in st.indexes.values_mut() {
            idx.flush(self.driver(), &table_name)?;
        }
        Ok(())
    }
}
