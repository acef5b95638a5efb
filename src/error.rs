//! Error types for the assistant core.

/// Top-level error type for the routing and execution core.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Configuration load or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Intent classifier transport or protocol error.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Language model generation error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// SQLite store error.
    #[error("store error: {0}")]
    Store(String),

    /// HTTP transport error against an external service.
    #[error("http error: {0}")]
    Http(String),

    /// Bounded wait on a network-backed operation expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A function argument failed schema validation.
    #[error("invalid argument `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// The user interrupted an in-flight operation. Not a failure.
    #[error("operation interrupted")]
    Interrupted,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error between pipeline stages.
    #[error("channel error: {0}")]
    Channel(String),
}

impl AssistantError {
    /// Whether this error is worth one bounded retry at a manager boundary.
    ///
    /// Only transport-level failures qualify; validation, store, and
    /// interruption outcomes are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
