//! Error types for the firewall proxy.
//!
//! Every failure in the request pipeline maps to a distinct client-visible
//! status; nothing is silently retried.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Firewall error taxonomy.
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("Invalid API key")]
    Unauthorized,

    #[error("Daily budget exceeded. Spent: ${spent:.4} / Limit: ${limit:.2}")]
    BudgetExceeded { spent: f64, limit: f64 },

    #[error("Invalid request body: {0}")]
    MalformedRequest(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timeout")]
    UpstreamTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for FirewallError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            FirewallError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            FirewallError::BudgetExceeded { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "BUDGET_EXCEEDED")
            }
            FirewallError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, "MALFORMED_REQUEST"),
            FirewallError::UpstreamUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE")
            }
            FirewallError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            FirewallError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for FirewallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FirewallError::UpstreamTimeout
        } else {
            FirewallError::UpstreamUnavailable(e.to_string())
        }
    }
}

impl From<token_meter::MeterError> for FirewallError {
    fn from(e: token_meter::MeterError) -> Self {
        FirewallError::Internal(e.to_string())
    }
}
