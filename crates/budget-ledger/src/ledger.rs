//! The spend ledger interface and key scheme.

use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Build the ledger key for a user's daily spend: `budget:{user}:{YYYY-MM-DD}`.
pub fn spend_key(user: &str, day: NaiveDate) -> String {
    format!("budget:{}:{}", user, day.format("%Y-%m-%d"))
}

/// External store of cumulative per-user, per-day spend in USD.
///
/// An absent entry reads as zero. `record` must be atomic with respect to
/// concurrent writers for the same key; the admission read and the
/// settlement write are deliberately not one transaction.
#[async_trait]
pub trait SpendLedger: Send + Sync {
    /// Current accumulated spend for (user, day). Absent key reads as zero.
    async fn spent(&self, user: &str, day: NaiveDate) -> Result<f64, LedgerError>;

    /// Atomically add `amount` USD to (user, day); returns the new total.
    async fn record(&self, user: &str, day: NaiveDate, amount: f64) -> Result<f64, LedgerError>;
}
