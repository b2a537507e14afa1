//! Post-flight cost settlement.
//!
//! Runs once per request after the relay reaches end-of-stream, detached
//! from the client-facing response path: the response is already delivered
//! (or the client already gone) by the time the ledger write happens.
//! Upstream-reported usage is preferred; otherwise output tokens are
//! estimated by tokenizing the accumulated delta text.

use crate::admission::RequestContext;
use crate::api::types::Usage;
use bytes::Bytes;
use budget_ledger::SpendLedger;
use serde_json::Value;
use std::sync::Arc;
use token_meter::{PricingTable, TokenMeter};
use tracing::{info, warn};

/// Terminal sentinel of an SSE completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Computes true request cost and applies it to the ledger.
pub struct Settler {
    ledger: Arc<dyn SpendLedger>,
    meter: TokenMeter,
    pricing: Arc<PricingTable>,
}

impl Settler {
    pub fn new(
        ledger: Arc<dyn SpendLedger>,
        meter: TokenMeter,
        pricing: Arc<PricingTable>,
    ) -> Self {
        Self {
            ledger,
            meter,
            pricing,
        }
    }

    /// Settle a streamed exchange from the accumulated SSE chunks.
    ///
    /// Detached: scheduled on the runtime and never awaited by the caller.
    /// Also invoked on client disconnect, so partial streams are billed for
    /// whatever was observed.
    pub fn settle_stream(self: &Arc<Self>, ctx: RequestContext, chunks: Vec<String>) {
        let settler = Arc::clone(self);
        detach(async move {
            let usage = extract_stream_usage(&chunks);
            let output_tokens = match usage.and_then(|u| u.completion_tokens) {
                Some(tokens) => tokens,
                None => settler.meter.count_text(&extract_output_text(&chunks)),
            };
            let input_tokens = usage
                .and_then(|u| u.prompt_tokens)
                .unwrap_or(ctx.input_tokens);
            settler.apply(&ctx, input_tokens, output_tokens).await;
        });
    }

    /// Settle a non-streaming exchange from the full response body.
    pub fn settle_body(self: &Arc<Self>, ctx: RequestContext, body: Bytes) {
        let settler = Arc::clone(self);
        detach(async move {
            let data: Value = match serde_json::from_slice(&body) {
                Ok(data) => data,
                Err(e) => {
                    warn!(user = %ctx.user, error = %e, "Unparseable upstream body, skipping settlement");
                    return;
                }
            };

            let usage = data
                .get("usage")
                .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());
            let output_tokens = match usage.and_then(|u| u.completion_tokens) {
                Some(tokens) => tokens,
                None => settler
                    .meter
                    .count_text(extract_message_content(&data).unwrap_or_default()),
            };
            let input_tokens = usage
                .and_then(|u| u.prompt_tokens)
                .unwrap_or(ctx.input_tokens);
            settler.apply(&ctx, input_tokens, output_tokens).await;
        });
    }

    /// Compute the true cost and increment the ledger.
    ///
    /// A failed write is logged and dropped: a bounded undercount, never a
    /// blocked or failed client response.
    async fn apply(&self, ctx: &RequestContext, input_tokens: usize, output_tokens: usize) {
        let cost = self.pricing.cost(&ctx.model, input_tokens, output_tokens);

        match self.ledger.record(&ctx.user, ctx.day, cost).await {
            Ok(total) => {
                info!(
                    user = %ctx.user,
                    model = %ctx.model,
                    input_tokens,
                    output_tokens,
                    cost,
                    total,
                    "Settled request"
                );
            }
            Err(e) => {
                warn!(
                    user = %ctx.user,
                    cost,
                    error = %e,
                    "Ledger write failed, dropping settlement"
                );
            }
        }
    }
}

/// Schedule a settlement future on the current runtime.
///
/// Called from `Drop` on the relay guard, so it must not assume an async
/// context beyond a reachable runtime handle.
fn detach<F>(future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => warn!("No runtime available, dropping settlement task"),
    }
}

/// Iterate the `data:` payloads of accumulated SSE chunks.
///
/// Chunks are joined before splitting into lines, so events split across
/// network reads are reassembled.
fn sse_payloads(chunks: &[String]) -> impl Iterator<Item = Value> + '_ {
    let joined = chunks.concat();
    joined
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:").map(|p| p.trim().to_string()))
        .filter(|payload| payload != DONE_SENTINEL)
        .filter_map(|payload| serde_json::from_str::<Value>(&payload).ok())
        .collect::<Vec<_>>()
        .into_iter()
}

/// Concatenate the assistant text fragments from accumulated SSE chunks.
pub fn extract_output_text(chunks: &[String]) -> String {
    let mut text = String::new();
    for event in sse_payloads(chunks) {
        let Some(choices) = event.get("choices").and_then(Value::as_array) else {
            continue;
        };
        for choice in choices {
            if let Some(content) = choice
                .get("delta")
                .and_then(|delta| delta.get("content"))
                .and_then(Value::as_str)
            {
                text.push_str(content);
            }
        }
    }
    text
}

/// Provider-reported usage from the stream, if any event carried it.
pub fn extract_stream_usage(chunks: &[String]) -> Option<Usage> {
    let mut usage = None;
    for event in sse_payloads(chunks) {
        if let Some(reported) = event
            .get("usage")
            .filter(|u| !u.is_null())
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        {
            usage = Some(reported);
        }
    }
    usage
}

/// Assistant content of a non-streaming response body.
fn extract_message_content(data: &Value) -> Option<&str> {
    data.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({
                "choices": [{"index": 0, "delta": {"content": content}}]
            })
        )
    }

    #[test]
    fn test_extract_output_text() {
        let chunks = vec![
            delta_event("Hello"),
            delta_event(", "),
            delta_event("world"),
            "data: [DONE]\n\n".to_string(),
        ];
        assert_eq!(extract_output_text(&chunks), "Hello, world");
    }

    #[test]
    fn test_extract_handles_split_events() {
        // One SSE event split across two network reads
        let event = delta_event("reassembled");
        let (a, b) = event.split_at(10);
        let chunks = vec![a.to_string(), b.to_string()];
        assert_eq!(extract_output_text(&chunks), "reassembled");
    }

    #[test]
    fn test_extract_skips_malformed_events() {
        let chunks = vec![
            "data: {not json}\n\n".to_string(),
            delta_event("ok"),
            ": comment line\n\n".to_string(),
        ];
        assert_eq!(extract_output_text(&chunks), "ok");
    }

    #[test]
    fn test_extract_empty_stream() {
        assert_eq!(extract_output_text(&[]), "");
        assert_eq!(extract_stream_usage(&[]), None);
    }

    #[test]
    fn test_extract_stream_usage() {
        let chunks = vec![
            delta_event("hi"),
            format!(
                "data: {}\n\n",
                serde_json::json!({
                    "choices": [],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 34}
                })
            ),
            "data: [DONE]\n\n".to_string(),
        ];
        let usage = extract_stream_usage(&chunks).unwrap();
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.completion_tokens, Some(34));
    }

    #[test]
    fn test_extract_stream_usage_absent() {
        let chunks = vec![delta_event("hi"), "data: [DONE]\n\n".to_string()];
        assert_eq!(extract_stream_usage(&chunks), None);
    }
}
