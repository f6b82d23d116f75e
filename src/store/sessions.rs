//! Wallet-session store: which wallets have settled payment for which skills.
//!
//! Keys are lowercase wallet addresses. A recorded pair entitles the wallet to
//! free reuse of that skill until the process (or snapshot history) forgets it,
//! which it never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSession {
    pub skills: BTreeSet<String>,
    #[serde(rename = "lastPayment")]
    pub last_payment: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionStore {
    wallets: BTreeMap<String, WalletSession>,
}

impl SessionStore {
    /// Upsert a paid skill for the wallet and stamp the settlement time.
    pub fn record(&mut self, wallet: &str, skill: &str) {
        if wallet.is_empty() {
            return;
        }
        let entry = self
            .wallets
            .entry(wallet.to_lowercase())
            .or_insert_with(|| WalletSession {
                skills: BTreeSet::new(),
                last_payment: Utc::now(),
            });
        entry.skills.insert(skill.to_string());
        entry.last_payment = Utc::now();
    }

    pub fn has(&self, wallet: &str, skill: &str) -> bool {
        if wallet.is_empty() {
            return false;
        }
        self.wallets
            .get(&wallet.to_lowercase())
            .map(|s| s.skills.contains(skill))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &WalletSession)> {
        self.wallets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lowercases_wallet_keys() {
        let mut store = SessionStore::default();
        store.record("0xABCdef", "screenshot");
        assert!(store.has("0xabcdef", "screenshot"));
        assert!(store.has("0xABCDEF", "screenshot"));
        assert!(!store.has("0xabcdef", "ai-analysis"));
    }

    #[test]
    fn empty_wallet_never_matches() {
        let mut store = SessionStore::default();
        store.record("", "screenshot");
        assert_eq!(store.len(), 0);
        assert!(!store.has("", "screenshot"));
    }

    #[test]
    fn record_is_idempotent_and_accumulates_skills() {
        let mut store = SessionStore::default();
        store.record("0xA", "screenshot");
        store.record("0xA", "screenshot");
        store.record("0xA", "markdown-to-pdf");
        assert_eq!(store.len(), 1);
        let (_, session) = store.iter().next().unwrap();
        assert_eq!(session.skills.len(), 2);
    }

    #[test]
    fn wire_shape() {
        let mut store = SessionStore::default();
        store.record("0xAbC", "screenshot");
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["0xabc"]["skills"][0], "screenshot");
        assert!(json["0xabc"]["lastPayment"].is_string());
    }
}
