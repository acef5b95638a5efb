//! Tsuzi: local voice/text assistant built around an intent-routing and
//! function-execution core.
//!
//! Every utterance flows: fast-path matcher → intent router → one of
//! {function executor, aggregate system query, passthrough generation} →
//! streaming synthesis. Six independently-failing capability managers
//! (tasks, alarms, timers, calendar, weather, news) sit behind a lazy,
//! fault-isolating registry, while the session state machine drives the
//! per-turn lifecycle and a background worker compresses older
//! conversation history.
//!
//! Speech recognition, synthesis, generation, and classification are
//! external collaborators consumed behind traits; the engineering core
//! of this crate is everything between them.

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod intent;
pub mod llm;
pub mod managers;
pub mod pipeline;
pub mod registry;
pub mod search;
pub mod session;
pub mod stt;
pub mod summarizer;
pub mod tts;

pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use executor::{ExecutionResult, FunctionExecutor, SystemLauncher};
pub use intent::{FunctionCall, Intent, IntentRouter, PassthroughMode, RouteOutcome};
pub use registry::{Lifecycle, ManagerHandle, ManagerRegistry};
pub use session::{InputSource, Session, SessionEvent, SessionState, UserInput};
