//! Per-operation cycle cache.
//!
//! Every top-level save or load owns one cache for the duration of the
//! recursive graph walk. The cache answers two questions: "have I seen
//! this exact instance?" (pointer identity, save path) and "have I seen
//! this type/key pair?" (load path), guaranteeing each distinct
//! instance is visited at most once per operation even through cycles.

use crate::types::Key;
use crate::value::SharedRecord;
use std::sync::Arc;

struct CacheEntry {
    type_name: String,
    key: Option<Key>,
    instance: SharedRecord,
}

/// Identity cache scoped to one recursive save or load.
#[derive(Default)]
pub struct CycleCache {
    entries: Vec<CacheEntry>,
}

impl CycleCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        CycleCache::default()
    }

    /// Registers an instance. A keyless entry still breaks reference
    /// cycles but cannot be found by key.
    pub fn add(&mut self, type_name: &str, instance: &SharedRecord, key: Option<&Key>) {
        if self.check_by_reference(instance) {
            return;
        }
        self.entries.push(CacheEntry {
            type_name: type_name.to_owned(),
            key: key.cloned(),
            instance: Arc::clone(instance),
        });
    }

    /// True if this exact instance (pointer identity) was already
    /// registered during the current operation.
    #[must_use]
    pub fn check_by_reference(&self, instance: &SharedRecord) -> bool {
        self.entries
            .iter()
            .any(|e| Arc::ptr_eq(&e.instance, instance))
    }

    /// Returns the key this instance was registered under, if any.
    #[must_use]
    pub fn key_for(&self, instance: &SharedRecord) -> Option<Key> {
        self.entries
            .iter()
            .find(|e| Arc::ptr_eq(&e.instance, instance))
            .and_then(|e| e.key.clone())
    }

    /// Returns the instance registered under the given type and key,
    /// if one was seen during the current operation.
    #[must_use]
    pub fn check_by_key(&self, type_name: &str, key: &Key) -> Option<SharedRecord> {
        self.entries
            .iter()
            .find(|e| e.type_name == type_name && e.key.as_ref() == Some(key))
            .map(|e| Arc::clone(&e.instance))
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    #[test]
    fn reference_identity_not_structural() {
        let mut cache = CycleCache::new();
        let a = Record::shared(Record::new("t"));
        let twin = Record::shared(Record::new("t"));
        cache.add("t", &a, Some(&Key::Int(1)));
        assert!(cache.check_by_reference(&a));
        assert!(!cache.check_by_reference(&twin));
    }

    #[test]
    fn key_lookup_requires_matching_type() {
        let mut cache = CycleCache::new();
        let a = Record::shared(Record::new("a"));
        cache.add("a", &a, Some(&Key::Int(1)));
        assert!(cache.check_by_key("a", &Key::Int(1)).is_some());
        assert!(cache.check_by_key("b", &Key::Int(1)).is_none());
        assert!(cache.check_by_key("a", &Key::Int(2)).is_none());
    }

    #[test]
    fn keyless_entries_break_cycles_only() {
        let mut cache = CycleCache::new();
        let a = Record::shared(Record::new("t"));
        cache.add("t", &a, None);
        assert!(cache.check_by_reference(&a));
        assert_eq!(cache.key_for(&a), None);
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let mut cache = CycleCache::new();
        let a = Record::shared(Record::new("t"));
        cache.add("t", &a, Some(&Key::Int(1)));
        cache.add("t", &a, Some(&Key::Int(1)));
        assert_eq!(cache.len(), 1);
    }
}
