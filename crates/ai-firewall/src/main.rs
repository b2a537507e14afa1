//! AI Firewall - Entry point.

use ai_firewall::api::{create_router, AppState};
use ai_firewall::config::Config;
use budget_ledger::{RedisLedger, SpendLedger};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        upstream = %config.upstream.base_url,
        daily_limit_usd = config.budget.daily_limit_usd,
        "Starting AI Firewall"
    );

    // Connect to the budget ledger
    let entry_ttl = Duration::from_secs(config.ledger.entry_ttl_hours * 3600);
    let ledger: Arc<dyn SpendLedger> =
        match RedisLedger::connect_with_ttl(&config.ledger.redis_url, entry_ttl).await {
            Ok(ledger) => Arc::new(ledger),
            Err(e) => {
                error!("Failed to connect to budget ledger: {}", e);
                std::process::exit(1);
            }
        };

    // Wire up the pipeline
    let state = match AppState::new(&config, ledger) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize proxy: {}", e);
            std::process::exit(1);
        }
    };

    let app = create_router(state);

    // Bind to address
    let addr = SocketAddr::new(
        config.server.listen_addr.parse().unwrap_or([0, 0, 0, 0].into()),
        config.server.port,
    );

    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
