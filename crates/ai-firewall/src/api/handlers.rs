//! HTTP request handlers.

use super::types::{ChatCompletionRequest, HealthResponse, UserId};
use super::AppState;
use crate::error::FirewallError;
use crate::relay::{self, SettlementGuard};
use crate::upstream::CHAT_COMPLETIONS_PATH;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::{info, warn};

/// Health check endpoint. Touches neither the ledger nor the upstream.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        upstream: state.upstream.base_url().to_string(),
        daily_limit_usd: state.admission.daily_limit_usd(),
    })
}

/// The proxied chat completion endpoint.
///
/// Pipeline: admission against the daily budget, verbatim forward to the
/// provider, relay of the response (streamed or whole-body), detached cost
/// settlement once the exchange is complete.
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    body: Bytes,
) -> Result<Response, FirewallError> {
    let payload: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| FirewallError::MalformedRequest(e.to_string()))?;

    let ctx = state.admission.admit(&user.0, &payload).await?;
    info!(
        user = %ctx.user,
        model = %ctx.model,
        stream = ctx.stream,
        input_tokens = ctx.input_tokens,
        "Proxying chat completion"
    );

    let upstream = state.upstream.forward(CHAT_COMPLETIONS_PATH, body).await?;

    if !upstream.status().is_success() {
        // The provider rejected the request; relay its own error body and
        // skip settlement since nothing was generated.
        let status = upstream.status();
        warn!(%status, "Upstream returned error status");
        let (status, body) = relay::passthrough(upstream).await?;
        return Ok(json_response(status, body));
    }

    if ctx.stream {
        let guard = SettlementGuard::new(Arc::clone(&state.settler), ctx);
        Ok(relay::relay_stream(upstream, guard))
    } else {
        let (status, body) = relay::passthrough(upstream).await?;
        state.settler.settle_body(ctx, body.clone());
        Ok(json_response(status, body))
    }
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
