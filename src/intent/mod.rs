//! Intent types produced by the router and fast-path matcher.
//!
//! The classifier's loosely-typed output is validated at the router
//! boundary and converted into these tagged variants; nothing downstream
//! ever sees raw model output.

pub mod fastpath;
pub mod router;
pub mod schema;

pub use router::{IntentRouter, RouteOutcome};

use serde_json::{Map, Value};

/// Generation behavior for passthrough conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughMode {
    /// Reasoning-heavy reply (math, coding, multi-step analysis).
    Thinking,
    /// Quick conversational reply.
    NonThinking,
}

/// A structured function call ready for the executor.
///
/// Produced by the router (after schema validation) or the fast-path
/// matcher; consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Registered function name.
    pub name: String,
    /// Validated arguments.
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    /// Build a call with a single string argument.
    pub fn with_arg(name: &str, key: &str, value: &str) -> Self {
        let mut arguments = Map::new();
        arguments.insert(key.to_owned(), Value::String(value.to_owned()));
        Self {
            name: name.to_owned(),
            arguments,
        }
    }

    /// Fetch a string argument, trimmed; `None` when absent or empty.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Fetch an integer argument.
    pub fn int_arg(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(Value::as_i64)
    }
}

/// A classified utterance.
///
/// The category determines the payload by construction: only `Action`
/// carries a function call.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Execute a structured action.
    Action {
        call: FunctionCall,
        confidence: f32,
        raw_text: String,
    },
    /// Aggregate a read across all managers.
    SystemQuery { confidence: f32, raw_text: String },
    /// Fall through to open-ended conversation.
    Passthrough {
        mode: PassthroughMode,
        confidence: f32,
        raw_text: String,
    },
}

impl Intent {
    /// The original utterance this intent was derived from.
    pub fn raw_text(&self) -> &str {
        match self {
            Self::Action { raw_text, .. }
            | Self::SystemQuery { raw_text, .. }
            | Self::Passthrough { raw_text, .. } => raw_text,
        }
    }

    /// Classifier confidence for this intent.
    pub fn confidence(&self) -> f32 {
        match self {
            Self::Action { confidence, .. }
            | Self::SystemQuery { confidence, .. }
            | Self::Passthrough { confidence, .. } => *confidence,
        }
    }
}
