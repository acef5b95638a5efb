//! Classifier-driven intent routing.
//!
//! Converts the routing model's loosely-typed payload into a validated
//! [`Intent`]. The executor never receives a call this module has not
//! checked against the registration table: an unknown function name or a
//! schema violation downgrades the utterance to passthrough conversation,
//! and a classifier outage fails open to conversation, never to action
//! execution.

use super::schema;
use super::{FunctionCall, Intent, PassthroughMode};
use crate::classifier::IntentClassifier;
use crate::config::RouterConfig;
use crate::history::Turn;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Routing verdict for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A routable intent.
    Routed(Intent),
    /// Confidence below threshold; the session speaks a fixed
    /// clarification phrase instead of acting.
    Ambiguous { raw_text: String, confidence: f32 },
}

/// Classifies utterances and validates the result into strict intents.
pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
    confidence_threshold: f32,
    context_turns: usize,
    debug_logging: bool,
}

impl IntentRouter {
    /// Create a router over the given classifier seam.
    pub fn new(classifier: Arc<dyn IntentClassifier>, config: &RouterConfig) -> Self {
        Self {
            classifier,
            confidence_threshold: config.confidence_threshold,
            context_turns: config.context_turns,
            debug_logging: config.debug_logging,
        }
    }

    /// Route an utterance.
    ///
    /// `history` is the full turn list; only the configured trailing
    /// window is forwarded to the classifier for disambiguation.
    pub async fn route(&self, text: &str, history: &[Turn]) -> RouteOutcome {
        let context_start = history.len().saturating_sub(self.context_turns);
        let payload = match self
            .classifier
            .classify(text, &history[context_start..])
            .await
        {
            Ok(p) => p,
            Err(e) => {
                // Fail open to conversation, never to action execution.
                warn!("classifier unavailable, passing through: {e}");
                return RouteOutcome::Routed(Intent::Passthrough {
                    mode: PassthroughMode::NonThinking,
                    confidence: 0.0,
                    raw_text: text.to_owned(),
                });
            }
        };

        if payload.confidence < self.confidence_threshold {
            if self.debug_logging {
                info!(
                    "router: ambiguous (confidence {:.2} < {:.2})",
                    payload.confidence, self.confidence_threshold
                );
            }
            return RouteOutcome::Ambiguous {
                raw_text: text.to_owned(),
                confidence: payload.confidence,
            };
        }

        let intent = resolve_intent(&payload.content, payload.confidence, text);
        if self.debug_logging {
            info!("router: {text:?} -> {intent:?}");
        }
        RouteOutcome::Routed(intent)
    }
}

/// Turn a raw classifier payload into a validated intent.
fn resolve_intent(content: &str, confidence: f32, raw_text: &str) -> Intent {
    let Some((name, arg_block)) = extract_call(content) else {
        // No call marker at all: treat as plain conversation.
        return Intent::Passthrough {
            mode: PassthroughMode::NonThinking,
            confidence,
            raw_text: raw_text.to_owned(),
        };
    };

    match name.as_str() {
        "thinking" => Intent::Passthrough {
            mode: PassthroughMode::Thinking,
            confidence,
            raw_text: raw_text.to_owned(),
        },
        "nonthinking" => Intent::Passthrough {
            mode: PassthroughMode::NonThinking,
            confidence,
            raw_text: raw_text.to_owned(),
        },
        "get_system_info" => Intent::SystemQuery {
            confidence,
            raw_text: raw_text.to_owned(),
        },
        _ => {
            let Some(spec) = schema::lookup(&name) else {
                warn!("router: unknown function {name:?}, downgrading to passthrough");
                return downgrade(confidence, raw_text);
            };

            let mut arguments = arg_block.map(|b| parse_arguments(&b)).unwrap_or_default();
            if arguments.is_empty() {
                arguments = fallback_arguments(&name, raw_text);
            }

            if let Err((field, reason)) = schema::validate_args(spec, &arguments) {
                warn!("router: {name} argument {field:?} invalid ({reason}), downgrading");
                return downgrade(confidence, raw_text);
            }

            Intent::Action {
                call: FunctionCall {
                    name,
                    arguments,
                },
                confidence,
                raw_text: raw_text.to_owned(),
            }
        }
    }
}

/// Downgraded passthrough for invalid actions; mode picked by heuristics.
fn downgrade(confidence: f32, raw_text: &str) -> Intent {
    Intent::Passthrough {
        mode: choose_mode(raw_text),
        confidence,
        raw_text: raw_text.to_owned(),
    }
}

/// Pick a passthrough mode from surface cues when the classifier did not
/// choose one: reasoning/explanation markers or long utterances think,
/// short conversational ones do not.
pub fn choose_mode(text: &str) -> PassthroughMode {
    const THINKING_CUES: &[&str] = &[
        "explain", "why", "how do", "how does", "write", "calculate", "solve", "analyze",
        "compare", "prove", "derive", "debug", "step by step",
    ];
    let lower = text.to_lowercase();
    if THINKING_CUES.iter().any(|cue| lower.contains(cue)) {
        return PassthroughMode::Thinking;
    }
    if lower.split_whitespace().count() > 16 {
        return PassthroughMode::Thinking;
    }
    PassthroughMode::NonThinking
}

/// Find the first `call:<name>` marker and its optional `{...}` argument
/// block in the model output.
fn extract_call(content: &str) -> Option<(String, Option<String>)> {
    let start = content.find("call:")? + "call:".len();
    let rest = &content[start..];

    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return None;
    }

    let after_name = &rest[name.len()..];
    let arg_block = after_name.strip_prefix('{').and_then(|body| {
        body.find('}').map(|end| body[..end].to_owned())
    });

    Some((name, arg_block))
}

/// Parse the routing model's custom argument format:
/// `key:<escape>value<escape>,key2:value2`.
///
/// Escaped values may contain commas; bare values run to the next comma.
/// Bare values are type-sniffed: all digits become integers and
/// `true`/`false` become booleans.
fn parse_arguments(block: &str) -> Map<String, Value> {
    const ESCAPE: &str = "<escape>";

    let mut args = Map::new();
    let mut rest = block;

    loop {
        rest = rest.trim_start_matches([',', ' ']);
        if rest.is_empty() {
            break;
        }

        let Some(colon) = rest.find(':') else { break };
        let key: String = rest[..colon]
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        rest = &rest[colon + 1..];

        let raw_value;
        if let Some(body) = rest.strip_prefix(ESCAPE) {
            let Some(end) = body.find(ESCAPE) else { break };
            raw_value = body[..end].to_owned();
            rest = &body[end + ESCAPE.len()..];
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            raw_value = rest[..end].trim().to_owned();
            rest = &rest[end..];
        }

        if key.is_empty() {
            continue;
        }
        args.insert(key, sniff_value(&raw_value));
    }

    args
}

/// Convert a bare argument string into the most specific JSON value.
fn sniff_value(raw: &str) -> Value {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_owned()),
    }
}

/// Synthesize the primary argument from the raw utterance when the model
/// emitted a call without an argument block, mirroring the routing
/// model's training format.
fn fallback_arguments(name: &str, raw_text: &str) -> Map<String, Value> {
    let key = match name {
        "set_timer" => "duration",
        "set_alarm" => "time",
        "create_calendar_event" => "title",
        "add_task" | "complete_task" => "text",
        "web_search" => "query",
        "cancel_timer" => "label",
        _ => return Map::new(),
    };
    let mut args = Map::new();
    args.insert(key.to_owned(), Value::String(raw_text.to_owned()));
    args
}
