//! Shared conversation history.
//!
//! A single mutex guards the turn list and the rolling summary. The
//! session loop is the only appender; the summarizer never touches live
//! turns — compaction hands it an owned snapshot of the older prefix,
//! removed under the lock, and the replacement summary is installed under
//! the same lock later.

use crate::llm::ChatMessage;
use std::sync::{Mutex, PoisonError};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire-format role string for chat completion requests.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Turn {
    fn new(role: Role, text: String) -> Self {
        Self {
            role,
            text,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct HistoryInner {
    turns: Vec<Turn>,
    summary: Option<String>,
}

/// Process-wide conversation state for the active session.
#[derive(Debug)]
pub struct ConversationHistory {
    recent_turns: usize,
    inner: Mutex<HistoryInner>,
}

impl ConversationHistory {
    /// Create an empty history keeping `recent_turns` turns verbatim.
    pub fn new(recent_turns: usize) -> Self {
        Self {
            recent_turns: recent_turns.max(1),
            inner: Mutex::new(HistoryInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a user turn.
    pub fn append_user(&self, text: &str) {
        self.lock().turns.push(Turn::new(Role::User, text.to_owned()));
    }

    /// Append an assistant turn.
    pub fn append_assistant(&self, text: &str) {
        self.lock()
            .turns
            .push(Turn::new(Role::Assistant, text.to_owned()));
    }

    /// Remove the trailing user turn, if any.
    ///
    /// Called when generation fails after the user turn was appended, so
    /// history never carries an unanswered turn.
    pub fn pop_dangling_user_turn(&self) -> bool {
        let mut inner = self.lock();
        if inner.turns.last().is_some_and(|t| t.role == Role::User) {
            inner.turns.pop();
            return true;
        }
        false
    }

    /// Clone of the current turn list.
    pub fn turns(&self) -> Vec<Turn> {
        self.lock().turns.clone()
    }

    /// Number of live turns.
    pub fn len(&self) -> usize {
        self.lock().turns.len()
    }

    /// Whether the history holds no turns.
    pub fn is_empty(&self) -> bool {
        self.lock().turns.is_empty()
    }

    /// Current rolling summary, if one has been installed.
    pub fn summary(&self) -> Option<String> {
        self.lock().summary.clone()
    }

    /// Split off turns older than the verbatim window.
    ///
    /// Returns the previous summary and the owned older turns for the
    /// summarizer; the live list keeps only the trailing window. Returns
    /// `None` when nothing needs compacting. The turn currently being
    /// produced is never included: compaction runs between turns, under
    /// the same lock that guards appends.
    pub fn compact(&self) -> Option<(Option<String>, Vec<Turn>)> {
        let mut inner = self.lock();
        if inner.turns.len() <= self.recent_turns {
            return None;
        }
        let split = inner.turns.len() - self.recent_turns;
        let older: Vec<Turn> = inner.turns.drain(..split).collect();
        Some((inner.summary.clone(), older))
    }

    /// Install a replacement rolling summary.
    pub fn install_summary(&self, summary: String) {
        self.lock().summary = Some(summary);
    }

    /// Assemble the messages array for a chat completion call: system
    /// prompt, then the summary (as a second system message) when
    /// present, then the live turns.
    pub fn build_context(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let inner = self.lock();
        let mut messages = Vec::with_capacity(inner.turns.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        if let Some(summary) = &inner.summary {
            messages.push(ChatMessage::system(&format!(
                "[Previous conversation summary: {summary}]"
            )));
        }
        for turn in &inner.turns {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_owned(),
                content: turn.text.clone(),
            });
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_keeps_the_trailing_window() {
        let history = ConversationHistory::new(2);
        for i in 0..5 {
            history.append_user(&format!("u{i}"));
        }
        let (summary, older) = history.compact().expect("should compact");
        assert!(summary.is_none());
        assert_eq!(older.len(), 3);
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].text, "u3");

        // Below the window nothing compacts.
        assert!(history.compact().is_none());
    }

    #[test]
    fn pop_dangling_only_removes_user_turns() {
        let history = ConversationHistory::new(6);
        history.append_user("hi");
        history.append_assistant("hello");
        assert!(!history.pop_dangling_user_turn());
        history.append_user("dangling");
        assert!(history.pop_dangling_user_turn());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn context_includes_summary_between_system_and_turns() {
        let history = ConversationHistory::new(6);
        history.append_user("hi");
        history.install_summary("we talked about tea".to_owned());
        let messages = history.build_context("persona");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("we talked about tea"));
        assert_eq!(messages[2].role, "user");
    }
}
