//! HTTP API for the firewall proxy.

mod handlers;
mod middleware;
pub mod types;

pub use handlers::*;
pub use middleware::{auth_middleware, logging_middleware, AuthGuard};

use crate::admission::AdmissionController;
use crate::config::Config;
use crate::error::FirewallError;
use crate::settlement::Settler;
use crate::upstream::UpstreamClient;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use budget_ledger::SpendLedger;
use std::sync::Arc;
use token_meter::{PricingTable, TokenMeter};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Inbound credential guard
    pub auth: Arc<AuthGuard>,
    /// Pre-flight budget admission
    pub admission: Arc<AdmissionController>,
    /// Upstream provider client
    pub upstream: Arc<UpstreamClient>,
    /// Post-flight cost settlement
    pub settler: Arc<Settler>,
}

impl AppState {
    /// Wire up the pipeline from configuration and a ledger backend.
    pub fn new(config: &Config, ledger: Arc<dyn SpendLedger>) -> Result<Self, FirewallError> {
        let meter = TokenMeter::new(&config.tokenizer.encoding)?;
        let pricing = Arc::new(PricingTable::builtin());

        let auth = Arc::new(AuthGuard::new(
            &config.auth.internal_api_key,
            config.auth.user_id.clone(),
        ));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&ledger),
            meter.clone(),
            Arc::clone(&pricing),
            config.budget.daily_limit_usd,
            config.budget.reserved_output_tokens,
        ));
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);
        let settler = Arc::new(Settler::new(ledger, meter, pricing));

        Ok(Self {
            auth,
            admission,
            upstream,
            settler,
        })
    }
}

/// Create the API router.
///
/// The health endpoint sits outside the authentication layer and stays
/// available regardless of ledger reachability.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route("/health", get(handlers::health))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
