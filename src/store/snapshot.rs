//! Snapshot persister.
//!
//! One JSON file holds the event log, wallet sessions, total-task counter,
//! and the process epoch. Live tasks are deliberately not persisted. The
//! loader treats a missing, empty, or corrupt file as a fresh start; it never
//! crashes the process.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use super::{events::EventLog, sessions::SessionStore, Ledger};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "paymentLog")]
    pub payment_log: EventLog,
    #[serde(rename = "siwxSessions")]
    pub siwx_sessions: SessionStore,
    #[serde(rename = "totalTasks")]
    pub total_tasks: u64,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

impl PersistedState {
    pub fn capture(ledger: &Ledger) -> Self {
        Self {
            payment_log: ledger.events.clone(),
            siwx_sessions: ledger.sessions.clone(),
            total_tasks: ledger.total_tasks,
            started_at: ledger.started_at,
            saved_at: Utc::now(),
        }
    }

    pub fn into_ledger(self) -> Ledger {
        Ledger {
            events: self.payment_log,
            sessions: self.siwx_sessions,
            total_tasks: self.total_tasks,
            started_at: self.started_at,
        }
    }
}

/// Load the ledger from disk. Absent/empty/corrupt files all yield a fresh
/// ledger with the current wall clock as epoch.
pub async fn load(path: impl AsRef<Path>) -> Ledger {
    let path = path.as_ref();
    let content = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(_) => {
            info!(path = %path.display(), "No snapshot file, starting fresh");
            return Ledger::new();
        }
    };
    if content.trim().is_empty() {
        info!(path = %path.display(), "Empty snapshot file, starting fresh");
        return Ledger::new();
    }
    match serde_json::from_str::<PersistedState>(&content) {
        Ok(state) => {
            info!(
                path = %path.display(),
                events = state.payment_log.len(),
                sessions = state.siwx_sessions.len(),
                total_tasks = state.total_tasks,
                "Restored snapshot"
            );
            state.into_ledger()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed snapshot, starting fresh");
            Ledger::new()
        }
    }
}

/// Write the ledger to disk. Failures are logged, not propagated; in-memory
/// state stays authoritative.
pub async fn save(path: impl AsRef<Path>, state: &PersistedState) {
    let path = path.as_ref();
    let content = match serde_json::to_string_pretty(state) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Snapshot serialisation failed");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = fs::create_dir_all(parent).await;
        }
    }
    match fs::write(path, content).await {
        Ok(()) => info!(path = %path.display(), "Snapshot saved"),
        Err(e) => warn!(path = %path.display(), error = %e, "Snapshot write failed"),
    }
}
