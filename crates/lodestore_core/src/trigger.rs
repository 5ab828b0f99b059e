//! Table triggers.
//!
//! Triggers observe and veto catalog operations. They are held as an
//! ordered vector per table entry and run in registration order; any
//! `before_*` hook returning false aborts the operation with a
//! [`crate::StoreError::TriggerSuppressed`] error before any key or
//! index state has been touched.

use crate::types::Key;
use crate::value::SharedRecord;
use std::fmt;

/// Which operation a trigger vetoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// A before-save hook returned false.
    Save,
    /// A before-delete hook returned false.
    Delete,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Save => write!(f, "save"),
            TriggerKind::Delete => write!(f, "delete"),
        }
    }
}

/// A trigger attached to one table.
///
/// All hooks have default no-op implementations, so implementors only
/// override what they need. Hooks run synchronously inside the
/// operation that fires them; a `before_*` veto must leave no trace,
/// which the catalog guarantees by running vetoes before any mutation.
pub trait TableTrigger: Send + Sync {
    /// Runs before an instance is written. Returning false vetoes the save.
    fn before_save(&self, instance: &SharedRecord) -> bool {
        let _ = instance;
        true
    }

    /// Runs after an instance and its indexes have been written.
    fn after_save(&self, instance: &SharedRecord, key: &Key) {
        let _ = (instance, key);
    }

    /// Runs before a key is deleted. Returning false vetoes the delete.
    fn before_delete(&self, key: &Key) -> bool {
        let _ = key;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passive;
    impl TableTrigger for Passive {}

    #[test]
    fn default_hooks_allow_everything() {
        let t = Passive;
        let rec = crate::value::Record::shared(crate::value::Record::new("t"));
        assert!(t.before_save(&rec));
        assert!(t.before_delete(&Key::Int(1)));
    }

    #[test]
    fn kind_display() {
        assert_eq!(TriggerKind::Save.to_string(), "save");
        assert_eq!(TriggerKind::Delete.to_string(), "delete");
    }
}
