//! Request and response types for the proxy API.

use serde::{Deserialize, Serialize};

/// Resolved user identity, injected by the authentication guard.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

/// The fields of an inbound chat completion request the proxy needs to see.
///
/// Everything else in the body is opaque and forwarded verbatim; this type
/// is parsed from a copy of the raw bytes, never re-serialized.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Target model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ordered role/content message objects. Kept as raw JSON so token
    /// counting can walk arbitrary string fields.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,

    /// Whether the client requested a streamed response.
    #[serde(default)]
    pub stream: bool,
}

fn default_model() -> String {
    "unknown".into()
}

/// Token usage as reported by the provider.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub upstream: String,
    pub daily_limit_usd: f64,
}
