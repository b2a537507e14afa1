//! Redis-backed spend ledger.

use crate::error::LedgerError;
use crate::ledger::{spend_key, SpendLedger};
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

/// Default TTL applied to daily entries: two days covers timezone skew while
/// keeping stale keys from accumulating.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(48 * 3600);

/// Spend ledger backed by Redis `INCRBYFLOAT` counters.
///
/// The connection manager reconnects transparently; callers see transient
/// failures as [`LedgerError::Unreachable`].
#[derive(Clone)]
pub struct RedisLedger {
    conn: ConnectionManager,
    entry_ttl: Duration,
}

impl RedisLedger {
    /// Connect to Redis at `url` with the default entry TTL.
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        Self::connect_with_ttl(url, DEFAULT_ENTRY_TTL).await
    }

    /// Connect to Redis at `url` with a custom entry TTL.
    pub async fn connect_with_ttl(url: &str, entry_ttl: Duration) -> Result<Self, LedgerError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!(url = %url, "Connected to budget ledger");
        Ok(Self { conn, entry_ttl })
    }
}

#[async_trait]
impl SpendLedger for RedisLedger {
    async fn spent(&self, user: &str, day: NaiveDate) -> Result<f64, LedgerError> {
        let key = spend_key(user, day);
        let mut conn = self.conn.clone();
        let value: Option<f64> = conn.get(&key).await?;
        Ok(value.unwrap_or(0.0))
    }

    async fn record(&self, user: &str, day: NaiveDate, amount: f64) -> Result<f64, LedgerError> {
        let key = spend_key(user, day);
        // Round to avoid unbounded float noise accumulating in the counter.
        let amount = (amount * 1e8).round() / 1e8;

        let mut conn = self.conn.clone();
        let total: f64 = conn.incr(&key, amount).await?;
        // Refresh TTL on every write so entries expire after the day is over.
        let _: bool = conn.expire(&key, self.entry_ttl.as_secs() as i64).await?;

        debug!(user, %key, amount, total, "Recorded spend");
        Ok(total)
    }
}
