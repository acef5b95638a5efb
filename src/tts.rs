//! Text-to-speech seam.
//!
//! Synthesis is consumed behind a trait and invoked per-sentence by the
//! streaming coordinator, so audio starts before generation finishes. The
//! null implementation supports text-only operation.

use crate::config::TtsConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Synthesizes speech audio for a piece of text.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one sentence (or a full response in non-streaming mode).
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Synthesizer over an OpenAI-compatible `/audio/speech` endpoint.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    api_url: String,
    model: String,
    voice: String,
}

impl HttpSynthesizer {
    /// Create a synthesizer client from TTS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Tts(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            voice: config.voice.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
        });

        let url = format!("{}/audio/speech", self.api_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout(format!("tts: {e}"))
                } else {
                    AssistantError::Tts(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| AssistantError::Tts(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssistantError::Tts(format!("body read: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Synthesizer that produces no audio. Used when no TTS endpoint is
/// configured, keeping the rest of the pipeline unchanged.
pub struct NullSynthesizer;

#[async_trait]
impl Synthesizer for NullSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
