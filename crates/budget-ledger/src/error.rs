//! Ledger errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),

    #[error("Ledger protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for LedgerError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
            LedgerError::Unreachable(e.to_string())
        } else {
            LedgerError::Protocol(e.to_string())
        }
    }
}
