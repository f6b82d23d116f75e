use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::executor::ExecutorRegistry;
use crate::payment::{Facilitator, LocalFacilitator, RemoteFacilitator};
use crate::store::{self, tasks::TaskStore, Ledger, SharedLedger};

/// Owned server context threaded through every handler. Built once in `main`;
/// nothing in the gateway is a module-level mutable.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tasks: Arc<TaskStore>,
    pub ledger: SharedLedger,
    pub executors: Arc<ExecutorRegistry>,
    pub facilitator: Arc<dyn Facilitator>,
    /// Process start, for /health uptime. The ledger's `started_at` is the
    /// persisted epoch and survives restarts; this one does not.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, ledger: Ledger) -> Self {
        let executors = Arc::new(ExecutorRegistry::from_config(&config));
        let facilitator: Arc<dyn Facilitator> = match &config.payment.facilitator_url {
            Some(url) => Arc::new(RemoteFacilitator::new(url.clone())),
            None => Arc::new(LocalFacilitator),
        };
        Self {
            config,
            tasks: Arc::new(TaskStore::new()),
            ledger: store::shared(ledger),
            executors,
            facilitator,
            started_at: Utc::now(),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(Config::for_tests("unused.json"), Ledger::new())
    }
}
