//! Background conversation summarizer.
//!
//! A single worker consumes a bounded queue of compaction jobs and
//! publishes the replacement summary back into the shared history. The
//! session loop submits jobs without blocking — when the queue is full
//! the job is skipped and the turns simply wait for the next compaction.

use crate::history::{ConversationHistory, Role, Turn};
use crate::llm::LanguageBackend;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One compaction request: the summary in force when the turns were
/// split off, plus the owned turns to fold into it.
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub previous: Option<String>,
    pub turns: Vec<Turn>,
}

/// Handle to the background summarization worker.
pub struct Summarizer {
    tx: mpsc::Sender<SummaryJob>,
    worker: JoinHandle<()>,
}

impl Summarizer {
    /// Spawn the worker. `model` selects the summarization model on the
    /// generation backend.
    pub fn spawn(
        llm: Arc<dyn LanguageBackend>,
        model: String,
        history: Arc<ConversationHistory>,
        queue_size: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<SummaryJob>(queue_size.max(1));
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let prompt = build_prompt(job.previous.as_deref(), &job.turns);
                match llm.complete(&model, &prompt).await {
                    Ok(summary) if !summary.is_empty() => {
                        info!("installed conversation summary ({} chars)", summary.len());
                        history.install_summary(summary);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("summarization failed: {e}"),
                }
            }
        });
        Self { tx, worker }
    }

    /// Submit a job without blocking. Returns `false` when the queue is
    /// full and the job was skipped.
    pub fn try_submit(&self, job: SummaryJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                info!("summary queue full, skipping compaction round");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Close the queue and wait for the worker to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}

/// Build the compression prompt from the prior summary and the turns to
/// fold in.
fn build_prompt(previous: Option<&str>, turns: &[Turn]) -> String {
    let mut conversation = String::new();
    for turn in turns {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        conversation.push_str(speaker);
        conversation.push_str(": ");
        conversation.push_str(&turn.text);
        conversation.push('\n');
    }

    format!(
        "Summarize this conversation concisely, preserving key facts, decisions, \
         and context needed for continuity.\n\n\
         Previous summary: {}\n\n\
         New conversation to incorporate:\n{conversation}\n\
         Provide a brief, factual summary (3-4 sentences max):",
        previous.unwrap_or("None"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::GenerationRequest;
    use crate::pipeline::messages::TokenChunk;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Backend that summarizes by counting the turns it was shown.
    struct CountingBackend;

    #[async_trait]
    impl LanguageBackend for CountingBackend {
        async fn stream(
            &self,
            _request: GenerationRequest,
            _tx: mpsc::Sender<TokenChunk>,
            _cancel: &CancellationToken,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn complete(&self, _model: &str, prompt: &str) -> Result<String> {
            let turns = prompt.matches("User:").count() + prompt.matches("Assistant:").count();
            Ok(format!("summary of {turns} turns"))
        }
    }

    #[tokio::test]
    async fn worker_installs_summary_without_blocking_appends() {
        let history = Arc::new(ConversationHistory::new(2));
        for i in 0..6 {
            history.append_user(&format!("message {i}"));
        }

        let summarizer = Summarizer::spawn(
            Arc::new(CountingBackend),
            String::new(),
            Arc::clone(&history),
            2,
        );

        let (previous, older) = history.compact().expect("needs compaction");
        assert_eq!(older.len(), 4);
        assert!(summarizer.try_submit(SummaryJob {
            previous,
            turns: older,
        }));

        // The session loop keeps appending while the worker runs.
        history.append_user("live turn");

        summarizer.shutdown().await;
        assert_eq!(history.summary().as_deref(), Some("summary of 4 turns"));
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn full_queue_skips_instead_of_blocking() {
        let history = Arc::new(ConversationHistory::new(2));
        // Queue of one, worker kept busy by a slow first job.
        struct SlowBackend;
        #[async_trait]
        impl LanguageBackend for SlowBackend {
            async fn stream(
                &self,
                _r: GenerationRequest,
                _t: mpsc::Sender<TokenChunk>,
                _c: &CancellationToken,
            ) -> Result<bool> {
                Ok(false)
            }
            async fn complete(&self, _m: &str, _p: &str) -> Result<String> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok("slow".to_owned())
            }
        }

        let summarizer =
            Summarizer::spawn(Arc::new(SlowBackend), String::new(), Arc::clone(&history), 1);
        let job = SummaryJob {
            previous: None,
            turns: vec![],
        };
        assert!(summarizer.try_submit(job.clone()));
        // Worker busy; queue holds one; the next submit may queue, the
        // one after must be skipped.
        let mut accepted = 0;
        for _ in 0..3 {
            if summarizer.try_submit(job.clone()) {
                accepted += 1;
            }
        }
        assert!(accepted < 3);
        summarizer.shutdown().await;
    }
}
