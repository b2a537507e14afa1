//! Authentication guard and request logging middleware.

use super::AppState;
use crate::api::types::UserId;
use crate::error::FirewallError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Validates the inbound bearer credential against the configured internal
/// key and resolves it to a user identity.
///
/// Comparison is over SHA-256 digests so the match does not short-circuit on
/// the first differing byte of the secret.
pub struct AuthGuard {
    key_digest: [u8; 32],
    user_id: String,
}

impl AuthGuard {
    pub fn new(internal_api_key: &str, user_id: impl Into<String>) -> Self {
        Self {
            key_digest: Sha256::digest(internal_api_key.as_bytes()).into(),
            user_id: user_id.into(),
        }
    }

    /// Returns the resolved user identity if the token matches.
    pub fn verify(&self, token: &str) -> Option<UserId> {
        let digest: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        if digest == self.key_digest {
            Some(UserId(self.user_id.clone()))
        } else {
            None
        }
    }
}

/// Authentication middleware.
///
/// Rejects with 401 before any ledger access when the `Authorization: Bearer`
/// header is missing or does not match the internal key. On success the
/// resolved [`UserId`] is attached as a request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, FirewallError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let user = match token.and_then(|token| state.auth.verify(token)) {
        Some(user) => user,
        None => {
            warn!("Rejected request with missing or invalid API key");
            return Err(FirewallError::Unauthorized);
        }
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Logging middleware for requests.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_success() {
        debug!(%method, %uri, %status, ?duration, "Request completed");
    } else {
        warn!(%method, %uri, %status, ?duration, "Request failed");
    }

    response
}
