//! Store event bus.
//!
//! Every mutating catalog operation emits an event carrying a
//! monotonically increasing sequence number. Subscribers receive
//! events over mpsc channels; disconnected receivers are pruned on the
//! next emit. A bounded in-memory history supports cursor-based
//! polling for callers that prefer pull over push.

use crate::types::Key;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An instance was written.
    Saved,
    /// An instance was read.
    Loaded,
    /// A key was removed.
    Deleted,
    /// A table was emptied.
    Truncated,
    /// Every table was emptied.
    Purged,
}

/// One store event.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// Monotonic sequence number, unique across the store.
    pub sequence: u64,
    /// What happened.
    pub kind: EventKind,
    /// The table's type name. Empty for store-wide events.
    pub table: String,
    /// The affected key, when the event concerns one instance.
    pub key: Option<Key>,
}

/// Notice that a batch operation observed its cancellation token.
#[derive(Debug, Clone)]
pub struct CancelNotice {
    /// The operation that stopped.
    pub operation: String,
}

/// Fan-out bus for store events and cancellation notices.
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<StoreEvent>>>,
    cancel_subscribers: RwLock<Vec<Sender<CancelNotice>>>,
    history: RwLock<Vec<StoreEvent>>,
    max_history: usize,
    next_sequence: AtomicU64,
}

impl EventBus {
    /// Creates a bus retaining at most `max_history` events.
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        EventBus {
            subscribers: RwLock::new(Vec::new()),
            cancel_subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Subscribes to cancellation notices. These are kept apart from
    /// store events so a cancellation listener never has to filter
    /// data traffic.
    pub fn subscribe_canceled(&self) -> Receiver<CancelNotice> {
        let (tx, rx) = channel();
        self.cancel_subscribers.write().push(tx);
        rx
    }

    /// Emits an event, assigning its sequence number.
    pub fn emit(&self, kind: EventKind, table: &str, key: Option<Key>) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = StoreEvent {
            sequence,
            kind,
            table: table.to_owned(),
            key,
        };

        {
            let mut history = self.history.write();
            history.push(event.clone());
            let len = history.len();
            if len > self.max_history {
                history.drain(..len - self.max_history);
            }
        }

        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
        sequence
    }

    /// Emits a cancellation notice.
    pub fn emit_canceled(&self, operation: &str) {
        let notice = CancelNotice {
            operation: operation.to_owned(),
        };
        self.cancel_subscribers
            .write()
            .retain(|tx| tx.send(notice.clone()).is_ok());
    }

    /// Returns up to `limit` retained events with sequence greater
    /// than `cursor`, oldest first.
    #[must_use]
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<StoreEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// The sequence number of the most recent event, 0 if none.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst) - 1
    }

    /// Number of live event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
