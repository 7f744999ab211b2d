//! Client for the external text-to-speech service.
//!
//! The synthesizer is an external collaborator reached over HTTP, not part of
//! the pipeline. When it is unreachable or fails, callers receive a structured
//! fallback pointing them at the browser's local speech synthesis.

use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a synthesis request.
pub enum TtsOutcome {
    Audio { content_type: String, data: Vec<u8> },
    /// The caller should fall back to local speech synthesis.
    Unavailable { message: String },
}

#[derive(Clone)]
pub struct TtsClient {
    base_url: String,
    http: Client,
}

impl TtsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Probe the service's health endpoint; reachable means responding and
    /// reporting a loaded model.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await;
        match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Value>()
                .await
                .map(|body| body["model_loaded"].as_bool().unwrap_or(false))
                .unwrap_or(false),
            Ok(resp) => {
                warn!("TTS health probe returned {}", resp.status());
                false
            }
            Err(e) => {
                info!("TTS service not available: {}", e);
                false
            }
        }
    }

    pub async fn synthesize(&self, text: &str, language: &str) -> TtsOutcome {
        if !self.is_available().await {
            return TtsOutcome::Unavailable {
                message: "TTS service not available, use Web Speech API instead".to_string(),
            };
        }

        let url = format!("{}/synthesize", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(SYNTHESIS_TIMEOUT)
            .json(&json!({ "text": text, "language": language }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("audio/wav")
                    .to_string();
                match resp.bytes().await {
                    Ok(data) => {
                        info!(language, bytes = data.len(), "TTS synthesis completed");
                        TtsOutcome::Audio {
                            content_type,
                            data: data.to_vec(),
                        }
                    }
                    Err(e) => {
                        warn!("failed to read TTS audio body: {}", e);
                        TtsOutcome::Unavailable {
                            message: "TTS synthesis failed, use Web Speech API instead"
                                .to_string(),
                        }
                    }
                }
            }
            Ok(resp) => {
                warn!("TTS synthesis returned {}", resp.status());
                TtsOutcome::Unavailable {
                    message: "TTS synthesis failed, use Web Speech API instead".to_string(),
                }
            }
            Err(e) => {
                warn!("TTS synthesis request failed: {}", e);
                TtsOutcome::Unavailable {
                    message: "TTS synthesis failed, use Web Speech API instead".to_string(),
                }
            }
        }
    }
}
