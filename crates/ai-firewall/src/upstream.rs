//! Upstream forwarder.
//!
//! Rewrites the outbound request: the internal bearer credential is replaced
//! with the provider credential, the JSON body is forwarded verbatim, and the
//! call goes to the configured base URL plus the original path. Failed calls
//! fail the client request immediately; retries are a client responsibility.

use crate::config::UpstreamConfig;
use crate::error::FirewallError;
use bytes::Bytes;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

/// Path of the proxied chat completion endpoint.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// HTTP client for the upstream provider.
///
/// The provider API key is stored as a `SecretString` to prevent accidental
/// exposure in logs or debug output.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl UpstreamClient {
    /// Build the client from configuration. Constructed once at startup.
    pub fn new(config: &UpstreamConfig) -> Result<Self, FirewallError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| FirewallError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::new(config.api_key.clone()),
        })
    }

    /// The configured provider base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward a request body to the provider.
    ///
    /// The response is returned unread so the relay can consume it
    /// incrementally. Connect failures map to `UpstreamUnavailable`,
    /// timeouts to `UpstreamTimeout`; there is no retry.
    pub async fn forward(
        &self,
        path: &str,
        body: Bytes,
    ) -> Result<reqwest::Response, FirewallError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, bytes = body.len(), "Forwarding request upstream");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .body(body)
            .send()
            .await?;

        Ok(response)
    }
}
