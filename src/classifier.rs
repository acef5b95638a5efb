//! Intent classifier seam.
//!
//! The routing model is consumed behind a trait: the router hands it the
//! raw utterance (plus a little trailing conversation for disambiguation)
//! and gets back the model's loosely-typed payload. All parsing and
//! validation of that payload happens in the router, never here.

use crate::config::RouterConfig;
use crate::error::{AssistantError, Result};
use crate::history::Turn;
use crate::intent::schema;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Unvalidated classifier output.
#[derive(Debug, Clone)]
pub struct RawIntentPayload {
    /// The model's raw completion, expected to contain a
    /// `call:<name>{...}` marker.
    pub content: String,
    /// Classifier confidence in `[0, 1]`. Backends without a calibrated
    /// score report 1.0.
    pub confidence: f32,
}

/// Classifies raw text into an intent payload.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify an utterance, optionally conditioned on preceding turns.
    ///
    /// # Errors
    ///
    /// Returns an error when the classifier backend is unavailable; the
    /// router recovers by failing open to conversation.
    async fn classify(&self, text: &str, context: &[Turn]) -> Result<RawIntentPayload>;
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint
/// hosting the routing model.
pub struct ApiClassifier {
    client: reqwest::Client,
    api_url: String,
    model: String,
    system_prompt: String,
}

impl ApiClassifier {
    /// Create a classifier client from router configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &RouterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Classifier(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            system_prompt: build_system_prompt(),
        })
    }
}

#[async_trait]
impl IntentClassifier for ApiClassifier {
    async fn classify(&self, text: &str, context: &[Turn]) -> Result<RawIntentPayload> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.system_prompt,
        })];
        for turn in context {
            messages.push(serde_json::json!({
                "role": turn.role.as_str(),
                "content": turn.text,
            }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": text }));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": 0.0,
        });

        let url = format!("{}/chat/completions", self.api_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout(format!("classifier: {e}"))
                } else {
                    AssistantError::Classifier(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| AssistantError::Classifier(e.to_string()))?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Classifier(format!("malformed response: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AssistantError::Classifier("response carried no content".to_owned()))?
            .to_owned();

        debug!("classifier raw payload: {content:?}");

        Ok(RawIntentPayload {
            content,
            confidence: 1.0,
        })
    }
}

/// Render the function vocabulary into the routing model's system prompt.
///
/// The routing model is fine-tuned on this exact framing; the function
/// list is generated from the registration table so the prompt can never
/// drift from what the executor accepts.
fn build_system_prompt() -> String {
    let mut prompt =
        String::from("You are a model that can do function calling with the following functions:\n");
    for spec in schema::FUNCTIONS {
        prompt.push_str("- ");
        prompt.push_str(spec.name);
        prompt.push('(');
        let mut first = true;
        for arg in spec.args {
            if !first {
                prompt.push_str(", ");
            }
            prompt.push_str(arg.name);
            if !arg.required {
                prompt.push('?');
            }
            first = false;
        }
        prompt.push_str(")\n");
    }
    prompt.push_str("- thinking(prompt)\n- nonthinking(prompt)\n");
    prompt.push_str("Answer with call:<function>{<args>} only.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lists_every_registered_function() {
        let prompt = build_system_prompt();
        for spec in schema::FUNCTIONS {
            assert!(prompt.contains(spec.name), "missing {}", spec.name);
        }
        assert!(prompt.contains("thinking(prompt)"));
        assert!(prompt.contains("nonthinking(prompt)"));
    }
}
