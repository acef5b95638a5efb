//! Language model seam.
//!
//! Generation is consumed behind a trait: the session streams tokens for
//! passthrough replies, and the summarizer and news curation use plain
//! completions. The THINKING/NONTHINKING flag from the router selects the
//! model and sampling behavior here and nowhere else.

pub mod api;

pub use api::ApiLlm;

use crate::error::Result;
use crate::pipeline::messages::TokenChunk;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A single message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.to_owned(),
        }
    }

    /// Build a user message.
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.to_owned(),
        }
    }
}

/// A streaming generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Full message context (system prompt, summary, live turns).
    pub messages: Vec<ChatMessage>,
    /// Reasoning-heavy reply requested by the router.
    pub thinking: bool,
}

/// Generates text from prompts and conversation history.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    /// Stream a response token-by-token into `tx`.
    ///
    /// The producer observes `cancel` at every chunk boundary and stops
    /// promptly. Returns `true` when the stream ended because of
    /// cancellation rather than completion.
    ///
    /// # Errors
    ///
    /// Returns an error on transport or protocol failure; cancellation is
    /// not an error.
    async fn stream(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<TokenChunk>,
        cancel: &CancellationToken,
    ) -> Result<bool>;

    /// Run a single non-streaming completion against `model` (empty means
    /// the backend's default chat model).
    ///
    /// # Errors
    ///
    /// Returns an error on transport or protocol failure.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}
