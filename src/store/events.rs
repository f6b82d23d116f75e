//! Append-only payment event log.
//!
//! Ordering reflects the order of the updating operations; the snapshot
//! preserves the full log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PaymentRequired,
    PaymentReceived,
    PaymentVerified,
    PaymentSettled,
    PaymentRejected,
    SiwxAccess,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PaymentRequired => "payment-required",
            EventKind::PaymentReceived => "payment-received",
            EventKind::PaymentVerified => "payment-verified",
            EventKind::PaymentSettled => "payment-settled",
            EventKind::PaymentRejected => "payment-rejected",
            EventKind::SiwxAccess => "siwx-access",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub kind: EventKind,
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub skill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<PaymentEvent>,
}

impl EventLog {
    pub fn append(
        &mut self,
        kind: EventKind,
        task_id: &str,
        skill: &str,
        wallet: Option<&str>,
        network: Option<&str>,
    ) {
        self.events.push(PaymentEvent {
            kind,
            task_id: task_id.to_string(),
            skill: skill.to_string(),
            wallet: wallet.map(str::to_string),
            network: network.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaymentEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.events {
            *counts.entry(e.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Last `n` events, newest last.
    pub fn tail(&self, n: usize) -> &[PaymentEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }
}
