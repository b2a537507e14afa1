//! Streaming relay.
//!
//! Forwards upstream response data to the client as it arrives. Each chunk
//! is observed for later settlement and yielded unchanged in the same order
//! and granularity it was received; forwarding is back-pressured by the
//! client connection. The settlement guard travels with the stream so that
//! settlement runs on normal end, abnormal end, and client disconnect alike.

use crate::admission::RequestContext;
use crate::error::FirewallError;
use crate::settlement::{Settler, DONE_SENTINEL};
use axum::body::Body;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tracing::warn;

/// Accumulates observed stream data and schedules settlement on drop.
///
/// Dropping is the one path every stream outcome shares: sentinel reached,
/// upstream error, or the client going away mid-stream. Partial output is
/// billed rather than silently discounted.
pub struct SettlementGuard {
    settler: Arc<Settler>,
    ctx: RequestContext,
    chunks: Vec<String>,
}

impl SettlementGuard {
    pub fn new(settler: Arc<Settler>, ctx: RequestContext) -> Self {
        Self {
            settler,
            ctx,
            chunks: Vec::new(),
        }
    }

    /// Record a forwarded chunk. Accumulation and forwarding happen against
    /// the same observed bytes; the upstream is never re-read.
    pub fn observe(&mut self, bytes: &Bytes) {
        self.chunks
            .push(String::from_utf8_lossy(bytes).into_owned());
    }
}

impl Drop for SettlementGuard {
    fn drop(&mut self) {
        let chunks = std::mem::take(&mut self.chunks);
        self.settler.settle_stream(self.ctx.clone(), chunks);
    }
}

/// Single SSE error event emitted when the upstream stream breaks mid-flight.
fn error_event(message: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "error": {"message": message, "type": "proxy_error"}
        })
    )
}

/// Relay an upstream SSE response to the client.
///
/// Consumes the upstream body incrementally and yields each chunk as soon as
/// it is received, without batching. A mid-stream upstream error is surfaced
/// to the client as one error event followed by the terminal sentinel.
pub fn relay_stream(upstream: reqwest::Response, guard: SettlementGuard) -> Response {
    let stream = async_stream::stream! {
        let mut guard = guard;
        let mut body = upstream.bytes_stream();
        let mut terminated = false;

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    guard.observe(&bytes);
                    if String::from_utf8_lossy(&bytes).contains(DONE_SENTINEL) {
                        terminated = true;
                    }
                    yield Ok::<Bytes, std::io::Error>(bytes);
                }
                Err(e) => {
                    warn!(error = %e, "Upstream connection error mid-stream");
                    yield Ok(Bytes::from(error_event(&e.to_string())));
                    yield Ok(Bytes::from(format!("data: {DONE_SENTINEL}\n\n")));
                    terminated = true;
                    break;
                }
            }
        }

        if !terminated {
            warn!("Upstream stream closed without terminal sentinel");
        }
        // guard drops here, scheduling settlement over whatever was observed
    };

    let headers = [
        (header::CONTENT_TYPE, "text/event-stream"),
        (header::CACHE_CONTROL, "no-cache"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];

    (StatusCode::OK, headers, Body::from_stream(stream)).into_response()
}

/// Forward a buffered upstream response to the client verbatim.
///
/// Used for non-streaming exchanges and for upstream error statuses, where
/// the provider's own body is more useful to the client than a rewrap.
pub async fn passthrough(upstream: reqwest::Response) -> Result<(StatusCode, Bytes), FirewallError> {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = upstream.bytes().await?;
    Ok((status, body))
}
