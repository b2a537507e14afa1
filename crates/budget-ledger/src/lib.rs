//! Per-user daily spend ledger.
//!
//! The ledger is an external atomic counter store, not a billing system of
//! record: entries are keyed by `budget:{user}:{YYYY-MM-DD}`, created
//! implicitly on first write, and left to expire via TTL once the day has
//! passed. The Redis backend uses `INCRBYFLOAT` so concurrent settlements
//! never lose updates.

mod error;
mod ledger;
mod memory;
mod store;

pub use error::LedgerError;
pub use ledger::{spend_key, SpendLedger};
pub use memory::InMemoryLedger;
pub use store::{RedisLedger, DEFAULT_ENTRY_TTL};
