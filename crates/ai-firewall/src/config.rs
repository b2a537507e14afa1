//! Configuration for the firewall proxy, loaded from environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Proxy configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Inbound authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upstream provider configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Budget ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Daily budget configuration
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Tokenizer configuration
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Bearer token clients must present to the proxy
    #[serde(default = "default_internal_api_key")]
    pub internal_api_key: String,

    /// User identity the internal key resolves to
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Provider base URL (OpenRouter by default)
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,

    /// Provider API key substituted into forwarded requests
    #[serde(default)]
    pub api_key: String,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds (long, to cover slow streamed generations)
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// TTL applied to daily spend entries, in hours
    #[serde(default = "default_entry_ttl_hours")]
    pub entry_ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Daily spending cap per user, in USD
    #[serde(default = "default_daily_limit_usd")]
    pub daily_limit_usd: f64,

    /// Output tokens reserved at admission time. Zero preserves the
    /// input-cost-only estimate; a positive value additionally reserves
    /// that many output tokens at the model's output price.
    #[serde(default)]
    pub reserved_output_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerConfig {
    /// tiktoken encoding name
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            internal_api_key: default_internal_api_key(),
            user_id: default_user_id(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            api_key: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            entry_ttl_hours: default_entry_ttl_hours(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit_usd(),
            reserved_output_tokens: 0,
        }
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_internal_api_key() -> String {
    "changeme-internal-key".into()
}

fn default_user_id() -> String {
    "default".into()
}

fn default_upstream_base_url() -> String {
    "https://openrouter.ai/api".into()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    300
}

fn default_redis_url() -> String {
    "redis://redis:6379/0".into()
}

fn default_entry_ttl_hours() -> u64 {
    48
}

fn default_daily_limit_usd() -> f64 {
    5.0
}

fn default_encoding() -> String {
    "cl100k_base".into()
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
