//! Catalog configuration.

use std::time::Duration;

/// Tunables applied when a catalog is created.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an operation waits for a table lock before failing
    /// with a timeout error.
    pub operation_timeout: Duration,
    /// Maximum number of events retained for cursor-based polling.
    pub event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            operation_timeout: Duration::from_secs(5),
            event_history: 1024,
        }
    }
}

impl Config {
    /// Sets the table-lock timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the retained event history length.
    #[must_use]
    pub fn event_history(mut self, capacity: usize) -> Self {
        self.event_history = capacity;
        self
    }
}
