//! AI Firewall - budget-gated streaming proxy for LLM providers.
//!
//! Sits between a client application and an OpenAI-compatible provider to:
//! - Authenticate inbound requests against an internal bearer key
//! - Enforce a per-user daily spending cap before forwarding
//! - Relay streamed responses with no added latency
//! - Record the true cost of each exchange in the budget ledger

pub mod admission;
pub mod api;
pub mod config;
pub mod error;
pub mod relay;
pub mod settlement;
pub mod upstream;

pub use admission::{AdmissionController, RequestContext};
pub use config::Config;
pub use error::FirewallError;
pub use settlement::Settler;
pub use upstream::UpstreamClient;
