//! Hosted generative model invocation.
//!
//! `GeminiClient` posts the prompt plus inline base64 images to the Gemini
//! `generateContent` endpoint. Every failure is converted into a typed
//! `ModelError` at this boundary so the orchestrator decides what becomes of
//! it; nothing panics past here. A missing credential is not a failure: the
//! client reports `Unconfigured` without touching the network and the
//! orchestrator answers with a canned record.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// One image attached to a model request.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub base64: String,
    pub mime_type: String,
}

impl InlineImage {
    pub fn from_bytes(data: &[u8], mime_type: &str) -> Self {
        Self {
            base64: STANDARD.encode(data),
            mime_type: mime_type.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ModelReply {
    /// Raw model text, ready for normalization.
    Text(String),
    /// No credential configured; the caller substitutes a canned record.
    Unconfigured,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {details}")]
    Transport { details: String },
    #[error("model returned an unexpected payload: {details}")]
    Payload { details: String },
}

/// Retry behavior for the model call. The default is a single attempt: the
/// API is paid and slow, so retries are an explicit operator decision.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<ModelReply, ModelError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub retry: RetryPolicy,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.1,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct GeminiClient {
    config: GeminiConfig,
    http: Client,
}

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    async fn call_once(
        &self,
        api_key: &str,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<String, ModelError> {
        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.base64,
                }
            }));
        }

        let payload = json!({
            "generationConfig": {
                "temperature": self.config.temperature,
                "topP": 0.9,
                "topK": 40,
            },
            "contents": [ { "parts": parts } ],
        });

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_ENDPOINT, self.config.model, api_key
        );

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Transport {
                details: format!("status {status}: {}", truncate(&body, 300)),
            });
        }

        let body: Value = response.json().await.map_err(|e| ModelError::Payload {
            details: e.to_string(),
        })?;

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| ModelError::Payload {
                details: "no candidate text in response".to_string(),
            })?;

        Ok(text.to_string())
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<ModelReply, ModelError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!("no model API key configured, returning canned output");
            return Ok(ModelReply::Unconfigured);
        };

        let attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.call_once(api_key, prompt, images).await {
                Ok(text) => {
                    info!(
                        model = %self.config.model,
                        images = images.len(),
                        chars = text.len(),
                        "model call completed"
                    );
                    return Ok(ModelReply::Text(text));
                }
                Err(e) => {
                    warn!(attempt, attempts, "model call failed: {}", e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry.backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ModelError::Transport {
            details: "no attempts made".to_string(),
        }))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_short_circuits_without_network() {
        let client = GeminiClient::new(GeminiConfig::default());
        let reply = client.generate("prompt", &[]).await.unwrap();
        assert!(matches!(reply, ModelReply::Unconfigured));
    }

    #[test]
    fn inline_image_encodes_base64() {
        let image = InlineImage::from_bytes(b"abc", "image/png");
        assert_eq!(image.base64, "YWJj");
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn default_retry_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
    }
}
