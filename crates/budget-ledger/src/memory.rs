//! In-memory spend ledger for tests and single-process deployments.

use crate::error::LedgerError;
use crate::ledger::{spend_key, SpendLedger};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory ledger with the same atomicity guarantee as the Redis backend:
/// each `record` is a single read-modify-write under the write lock.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    entries: Arc<RwLock<HashMap<String, f64>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, used by tests to assert increments.
    pub async fn entries(&self) -> HashMap<String, f64> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl SpendLedger for InMemoryLedger {
    async fn spent(&self, user: &str, day: NaiveDate) -> Result<f64, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&spend_key(user, day)).copied().unwrap_or(0.0))
    }

    async fn record(&self, user: &str, day: NaiveDate, amount: f64) -> Result<f64, LedgerError> {
        let mut entries = self.entries.write().await;
        let total = entries.entry(spend_key(user, day)).or_insert(0.0);
        *total += amount;
        Ok(*total)
    }
}
