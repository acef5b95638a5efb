//! OpenAI-compatible chat completions backend.
//!
//! Works against any server implementing the OpenAI API surface (Ollama,
//! llama.cpp server, vLLM, LM Studio). Streaming uses Server-Sent Events;
//! tokens are forwarded as they decode.

use super::{GenerationRequest, LanguageBackend};
use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::TokenChunk;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Language backend over an OpenAI-compatible HTTP API.
pub struct ApiLlm {
    client: reqwest::Client,
    config: LlmConfig,
    base_url: String,
}

impl ApiLlm {
    /// Create a backend from LLM configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Llm(e.to_string()))?;

        let base_url = config.api_url.trim_end_matches('/').to_owned();
        info!("LLM configured: {} model={}", base_url, config.chat_model);

        Ok(Self {
            client,
            config: config.clone(),
            base_url,
        })
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(url).json(body);
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }
        req
    }
}

#[async_trait]
impl LanguageBackend for ApiLlm {
    async fn stream(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<TokenChunk>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let body = serde_json::json!({
            "model": self.config.model_for_thinking(request.thinking),
            "messages": messages,
            "stream": true,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(map_transport)?
            .error_for_status()
            .map_err(|e| AssistantError::Llm(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut buf = String::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(true),
                chunk = stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let bytes = chunk.map_err(|e| AssistantError::Llm(format!("stream read: {e}")))?;
                    buf.push_str(&String::from_utf8_lossy(&bytes));

                    while let Some(pos) = buf.find('\n') {
                        let line = buf[..pos].trim_end_matches('\r').to_owned();
                        buf.drain(..=pos);

                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data.trim() == "[DONE]" {
                            return Ok(false);
                        }

                        let event: serde_json::Value = serde_json::from_str(data)
                            .map_err(|e| AssistantError::Llm(format!("SSE parse: {e}")))?;
                        let Some(content) = event["choices"][0]["delta"]["content"].as_str()
                        else {
                            continue;
                        };
                        if content.is_empty() {
                            continue;
                        }

                        let token = TokenChunk {
                            text: content.to_owned(),
                        };
                        tokio::select! {
                            () = cancel.cancelled() => return Ok(true),
                            sent = tx.send(token) => {
                                if sent.is_err() {
                                    // Consumer went away; treat as cancellation.
                                    return Ok(true);
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(false)
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let model = if model.is_empty() {
            self.config.chat_model.as_str()
        } else {
            model
        };
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "temperature": 0.3,
        });

        let response = self
            .request(&body)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(map_transport)?
            .error_for_status()
            .map_err(|e| AssistantError::Llm(e.to_string()))?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("malformed response: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_owned())
            .ok_or_else(|| AssistantError::Llm("response carried no content".to_owned()))
    }
}

fn map_transport(e: reqwest::Error) -> AssistantError {
    if e.is_timeout() {
        AssistantError::Timeout(format!("llm: {e}"))
    } else {
        AssistantError::Llm(e.to_string())
    }
}
