//! Token meter errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Unknown tokenizer encoding: {0}")]
    UnknownEncoding(String),

    #[error("Tokenizer initialization failed: {0}")]
    Tokenizer(String),
}
