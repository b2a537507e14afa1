//! Tokenizer adapter backed by tiktoken BPE encodings.

use crate::error::MeterError;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Default encoding used when a model family is not recognized.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Per-message token overhead for chat-formatted requests (role framing).
const MESSAGE_OVERHEAD: usize = 4;

/// Priming tokens appended once per conversation.
const PRIMING_TOKENS: usize = 2;

/// Token counter for chat payloads.
///
/// Wraps a shared BPE instance; cloning is cheap and the meter is safe to
/// share across concurrent requests.
#[derive(Clone)]
pub struct TokenMeter {
    bpe: Arc<CoreBPE>,
    encoding: String,
}

impl TokenMeter {
    /// Create a meter for a named encoding.
    ///
    /// Unrecognized encoding names fall back to [`DEFAULT_ENCODING`] rather
    /// than failing, mirroring the pricing table's default entry.
    pub fn new(encoding: &str) -> Result<Self, MeterError> {
        let (bpe, resolved) = match encoding {
            "cl100k_base" => (tiktoken_rs::cl100k_base(), "cl100k_base"),
            "o200k_base" => (tiktoken_rs::o200k_base(), "o200k_base"),
            "p50k_base" => (tiktoken_rs::p50k_base(), "p50k_base"),
            "r50k_base" => (tiktoken_rs::r50k_base(), "r50k_base"),
            other => {
                debug!(encoding = other, "Unknown encoding, using default");
                (tiktoken_rs::cl100k_base(), DEFAULT_ENCODING)
            }
        };

        let bpe = bpe.map_err(|e| MeterError::Tokenizer(e.to_string()))?;

        Ok(Self {
            bpe: Arc::new(bpe),
            encoding: resolved.to_string(),
        })
    }

    /// The resolved encoding name.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Count tokens in a plain text string.
    pub fn count_text(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Count tokens for an OpenAI-style messages array.
    ///
    /// Each message carries a fixed framing overhead; every string field of
    /// the message object (role, content, name, ...) contributes its encoded
    /// length. Non-string content (e.g. multimodal parts) is skipped.
    pub fn count_messages(&self, messages: &[serde_json::Value]) -> usize {
        let mut tokens = 0;
        for message in messages {
            tokens += MESSAGE_OVERHEAD;
            if let Some(fields) = message.as_object() {
                for value in fields.values() {
                    if let Some(text) = value.as_str() {
                        tokens += self.count_text(text);
                    }
                }
            }
        }
        tokens + PRIMING_TOKENS
    }
}

impl std::fmt::Debug for TokenMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMeter")
            .field("encoding", &self.encoding)
            .finish()
    }
}
