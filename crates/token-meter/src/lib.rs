//! Token counting and per-model cost calculation.
//!
//! Two leaf pieces of the budget pipeline: a tiktoken-backed token counter
//! for chat payloads, and a static pricing table mapping model identifiers
//! to per-1k-token USD rates with a conservative default for unknown models.

mod error;
mod pricing;
mod tokenizer;

pub use error::MeterError;
pub use pricing::{ModelPricing, PricingTable, DEFAULT_PRICING};
pub use tokenizer::{TokenMeter, DEFAULT_ENCODING};
