//! Process-wide stores.
//!
//! The ledger groups the event log, wallet sessions, and the task counter
//! under a single lock so every snapshot is a consistent cut and event
//! ordering follows update ordering.

pub mod events;
pub mod sessions;
pub mod snapshot;
pub mod tasks;

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use events::EventLog;
use sessions::SessionStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub events: EventLog,
    pub sessions: SessionStore,
    pub total_tasks: u64,
    pub started_at: DateTime<Utc>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            events: EventLog::default(),
            sessions: SessionStore::default(),
            total_tasks: 0,
            started_at: Utc::now(),
        }
    }

    /// Next task ordinal; monotonic, survives restarts via the snapshot.
    pub fn count_task(&mut self) -> u64 {
        self.total_tasks += 1;
        self.total_tasks
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedLedger = Arc<RwLock<Ledger>>;

pub fn shared(ledger: Ledger) -> SharedLedger {
    Arc::new(RwLock::new(ledger))
}
