//! Configuration types for the assistant.
//!
//! One TOML file, read once at startup. There is no hot reload: components
//! capture the values they need at construction time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Input capture settings.
    pub input: InputConfig,
    /// Streaming token-to-speech settings.
    pub streaming: StreamingConfig,
    /// Intent router / classifier settings.
    pub router: RouterConfig,
    /// Language model settings (chat + summarization).
    pub llm: LlmConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Manager stores and network-backed fetch settings.
    pub managers: ManagersConfig,
    /// Conversation history / summarization settings.
    pub history: HistoryConfig,
}

/// Input capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Capture utterances from the microphone via the STT seam.
    /// When false the session reads typed text instead.
    pub audio_enabled: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            audio_enabled: false,
        }
    }
}

/// Streaming pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Feed generated sentences to synthesis while generation is still
    /// running. When false the full response is collected first.
    pub enabled: bool,
    /// Bounded capacity of the per-turn token channel.
    pub token_channel_size: usize,
    /// Flush a sentence to synthesis once the buffer exceeds this many
    /// characters, even without terminal punctuation.
    pub max_sentence_chars: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_channel_size: 64,
            max_sentence_chars: 100,
        }
    }
}

/// Intent router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Base URL of the OpenAI-compatible server hosting the routing model.
    pub api_url: String,
    /// Model name for classification requests.
    pub model: String,
    /// Intents below this confidence get a fixed clarification response
    /// instead of being routed.
    pub confidence_threshold: f32,
    /// Log every routing decision at info level.
    pub debug_logging: bool,
    /// Per-request timeout for classification calls.
    pub request_timeout_secs: u64,
    /// Number of trailing conversation turns forwarded for disambiguation.
    pub context_turns: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_owned(),
            model: "function-router".to_owned(),
            confidence_threshold: 0.35,
            debug_logging: false,
            request_timeout_secs: 10,
            context_turns: 2,
        }
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible chat completions server.
    pub api_url: String,
    /// API key; empty for local servers.
    pub api_key: String,
    /// Model used for nonthinking (conversational) replies.
    pub chat_model: String,
    /// Model used for thinking (reasoning-heavy) replies.
    /// Empty means reuse `chat_model`.
    pub thinking_model: String,
    /// Model used for background history summarization.
    /// Empty means reuse `chat_model`.
    pub summary_model: String,
    /// System prompt establishing the assistant persona.
    pub system_prompt: String,
    /// Sampling temperature for conversational replies.
    pub temperature: f32,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Per-request timeout. Streaming requests apply this to connection
    /// establishment; tokens then arrive until the stream closes.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_owned(),
            api_key: String::new(),
            chat_model: "llama3.2:latest".to_owned(),
            thinking_model: String::new(),
            summary_model: String::new(),
            system_prompt: "Your name is Tsuzi. You are a warm, cheerful, and \
                            conversational AI companion. You keep replies short \
                            enough to speak aloud and show genuine curiosity \
                            about what the user says."
                .to_owned(),
            temperature: 0.7,
            max_tokens: 512,
            request_timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// Model to use for the given passthrough mode.
    pub fn model_for_thinking(&self, thinking: bool) -> &str {
        if thinking && !self.thinking_model.is_empty() {
            &self.thinking_model
        } else {
            &self.chat_model
        }
    }

    /// Model to use for history summarization.
    pub fn summary_model(&self) -> &str {
        if self.summary_model.is_empty() {
            &self.chat_model
        } else {
            &self.summary_model
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Base URL of the OpenAI-compatible audio transcriptions endpoint.
    pub api_url: String,
    /// Transcription model name.
    pub model: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_owned(),
            model: "whisper-1".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the OpenAI-compatible speech endpoint. Empty disables
    /// synthesis (text-only operation).
    pub api_url: String,
    /// Synthesis model name.
    pub model: String,
    /// Voice identifier passed to the synthesis endpoint.
    pub voice: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            model: "kitten-tts".to_owned(),
            voice: "default".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// Manager stores and network fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagersConfig {
    /// Directory holding the per-manager SQLite stores.
    pub data_dir: PathBuf,
    /// Weather fetch settings.
    pub weather: WeatherConfig,
    /// News fetch settings.
    pub news: NewsConfig,
    /// Web search settings.
    pub search: SearchConfig,
}

impl Default for ManagersConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            weather: WeatherConfig::default(),
            news: NewsConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// Weather manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Forecast API base URL (Open-Meteo compatible).
    pub api_url: String,
    /// Latitude of the home location.
    pub latitude: f64,
    /// Longitude of the home location.
    pub longitude: f64,
    /// Seconds a fetched snapshot stays valid in the cache.
    pub cache_ttl_secs: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.open-meteo.com/v1/forecast".to_owned(),
            latitude: 31.4685,
            longitude: 76.2708,
            cache_ttl_secs: 600,
            request_timeout_secs: 5,
        }
    }
}

/// News manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// Seconds a fetched digest stays valid in the cache.
    pub cache_ttl_secs: u64,
    /// Maximum headlines in a digest.
    pub max_headlines: usize,
    /// Forward fetched headlines to the generation backend for curation.
    /// Curation failures degrade to the raw headlines.
    pub curation_enabled: bool,
    /// Per-request timeout for headline fetches.
    pub request_timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 900,
            max_headlines: 8,
            curation_enabled: true,
            request_timeout_secs: 10,
        }
    }
}

/// Web search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// HTML search endpoint to scrape.
    pub endpoint: String,
    /// Maximum results per query.
    pub max_results: usize,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_owned(),
            max_results: 5,
            request_timeout_secs: 10,
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Turns kept verbatim before older ones are compressed into the
    /// rolling summary.
    pub recent_turns: usize,
    /// Bounded capacity of the summarization job queue.
    pub summary_queue_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_turns: 6,
            summary_queue_size: 2,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AssistantError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Write the configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Default data directory: `{data_local_dir}/tsuzi`, falling back to a
/// relative `data/` when the platform dir cannot be resolved.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tsuzi"))
        .unwrap_or_else(|| PathBuf::from("data"))
}
