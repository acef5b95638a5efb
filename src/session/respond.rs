//! Deterministic spoken-result formatting.
//!
//! Every execution outcome becomes a short TTS-friendly line without a
//! model call; generation is reserved for passthrough conversation.

use crate::executor::ExecutionResult;

/// Fixed response when routing confidence is too low to act.
pub const AMBIGUOUS_RESPONSE: &str =
    "I'm not sure what you'd like me to do. Could you say that another way?";

/// Fixed apology when generation fails mid-turn.
pub const GENERATION_APOLOGY: &str = "Sorry, I'm having trouble thinking right now.";

/// Parting line for exit phrases.
pub const GOODBYE: &str = "Goodbye!";

/// Convert an execution result into the line the assistant speaks.
pub fn speak_result(result: &ExecutionResult) -> String {
    match result {
        ExecutionResult::Success { spoken, .. } => spoken.clone(),
        ExecutionResult::Declined { reason } => format!("Sorry, {reason}."),
        ExecutionResult::ManagerUnavailable { manager, .. } => {
            format!("Sorry, {manager} are not available right now.")
        }
        ExecutionResult::ValidationError { field, reason } => {
            format!("Sorry, I didn't catch the {field}: {reason}.")
        }
    }
}
