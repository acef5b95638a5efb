//! Per-turn session lifecycle.
//!
//! The [`Session`] loop is the sole driver of [`SessionState`]
//! transitions: capture, classify, act or generate, speak, return to
//! idle. Interruption is the only event legal from every state — it
//! cancels the turn's in-flight generation and synthesis at the next
//! chunk boundary and returns the machine to idle.

pub mod respond;

use crate::classifier::IntentClassifier;
use crate::config::AssistantConfig;
use crate::executor::{ExecutionResult, FunctionExecutor};
use crate::history::ConversationHistory;
use crate::intent::{fastpath, Intent, IntentRouter, PassthroughMode, RouteOutcome};
use crate::llm::{GenerationRequest, LanguageBackend};
use crate::managers::TimerFired;
use crate::pipeline::messages::{AudioSegment, SynthesizedAudio, TokenChunk};
use crate::pipeline::StreamingCoordinator;
use crate::stt::Transcriber;
use crate::summarizer::{Summarizer, SummaryJob};
use crate::tts::Synthesizer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Thinking,
    Acting,
    Speaking,
}

/// Events that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Activation trigger; begin capturing input.
    Activate,
    /// Input capture finished with usable text.
    CaptureComplete,
    /// The router chose an action or system query.
    RouteAction,
    /// The router chose passthrough conversation.
    RoutePassthrough,
    /// Execution or aggregation finished.
    ExecutionComplete,
    /// Playback of the response finished.
    PlaybackComplete,
    /// Explicit interruption; also covers abandoned turns (empty
    /// transcript, cancellation phrase).
    Interrupt,
}

/// Pure transition function. Returns `None` for an illegal edge.
///
/// `Interrupt` is the only event accepted from every state.
pub fn next_state(current: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent as E;
    use SessionState as S;
    match (current, event) {
        (_, E::Interrupt) => Some(S::Idle),
        (S::Idle, E::Activate) => Some(S::Listening),
        (S::Listening, E::CaptureComplete) => Some(S::Thinking),
        (S::Thinking, E::RouteAction) => Some(S::Acting),
        (S::Thinking, E::RoutePassthrough) => Some(S::Speaking),
        (S::Acting, E::ExecutionComplete) => Some(S::Speaking),
        (S::Speaking, E::PlaybackComplete) => Some(S::Idle),
        _ => None,
    }
}

/// One captured utterance.
#[derive(Debug, Clone)]
pub enum UserInput {
    Text(String),
    Audio(AudioSegment),
}

/// Source of utterances: microphone frontend, typed input, or a test
/// script. Implementations must be cancel-safe: the session polls the
/// source concurrently with timer notifications.
#[async_trait]
pub trait InputSource: Send {
    /// Wait for the next utterance; `None` ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying input fails permanently.
    async fn next_utterance(&mut self) -> crate::error::Result<Option<UserInput>>;
}

/// Handle for signalling interruption from outside the loop.
#[derive(Clone)]
pub struct Interrupter {
    tx: watch::Sender<u64>,
}

impl Interrupter {
    /// Interrupt whatever the session is doing; it returns to idle.
    pub fn interrupt(&self) {
        self.tx.send_modify(|n| *n += 1);
    }
}

/// Phrases that end the session.
const EXIT_PHRASES: &[&str] = &["exit", "quit", "goodbye", "shut down"];

/// Phrases that cancel the current exchange without acting.
const CANCEL_PHRASES: &[&str] = &["stop", "cancel", "cancel that", "never mind", "nevermind"];

/// The conversational session loop.
pub struct Session {
    config: AssistantConfig,
    router: IntentRouter,
    executor: Arc<FunctionExecutor>,
    llm: Arc<dyn LanguageBackend>,
    coordinator: StreamingCoordinator,
    transcriber: Option<Arc<dyn Transcriber>>,
    history: Arc<ConversationHistory>,
    summarizer: Option<Summarizer>,
    audio_tx: mpsc::Sender<SynthesizedAudio>,
    state: SessionState,
    state_tx: broadcast::Sender<SessionState>,
    interrupt_tx: watch::Sender<u64>,
    interrupt_rx: watch::Receiver<u64>,
}

impl Session {
    /// Create a session. Must be called from within a tokio runtime (the
    /// summarization worker is spawned here).
    pub fn new(
        config: AssistantConfig,
        classifier: Arc<dyn IntentClassifier>,
        llm: Arc<dyn LanguageBackend>,
        synthesizer: Arc<dyn Synthesizer>,
        executor: Arc<FunctionExecutor>,
        audio_tx: mpsc::Sender<SynthesizedAudio>,
    ) -> Self {
        let history = Arc::new(ConversationHistory::new(config.history.recent_turns));
        let router = IntentRouter::new(classifier, &config.router);
        let coordinator = StreamingCoordinator::new(synthesizer, &config.streaming);
        let summarizer = Summarizer::spawn(
            Arc::clone(&llm),
            config.llm.summary_model().to_owned(),
            Arc::clone(&history),
            config.history.summary_queue_size,
        );
        let (state_tx, _) = broadcast::channel(32);
        let (interrupt_tx, interrupt_rx) = watch::channel(0);

        Self {
            config,
            router,
            executor,
            llm,
            coordinator,
            transcriber: None,
            history,
            summarizer: Some(summarizer),
            audio_tx,
            state: SessionState::Idle,
            state_tx,
            interrupt_tx,
            interrupt_rx,
        }
    }

    /// Attach a transcriber for audio input.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Subscribe to state transitions.
    pub fn state_events(&self) -> broadcast::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Handle for signalling interruption.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            tx: self.interrupt_tx.clone(),
        }
    }

    /// The shared conversation history.
    pub fn history(&self) -> &Arc<ConversationHistory> {
        &self.history
    }

    /// Apply an event; illegal edges are logged, never panicked on.
    fn apply(&mut self, event: SessionEvent) {
        match next_state(self.state, event) {
            Some(next) => {
                debug!("session: {:?} --{event:?}--> {next:?}", self.state);
                self.state = next;
                let _ = self.state_tx.send(next);
            }
            None => warn!(
                "illegal session transition from {:?} on {event:?}",
                self.state
            ),
        }
    }

    /// Run turns until the source closes or an exit phrase arrives.
    ///
    /// # Errors
    ///
    /// Returns an error only when the input source fails permanently;
    /// per-turn failures degrade to spoken apologies.
    pub async fn run(&mut self, source: &mut dyn InputSource) -> crate::error::Result<()> {
        let mut timer_events = self
            .executor
            .registry()
            .timers()
            .ok()
            .and_then(|t| t.subscribe());

        loop {
            self.apply(SessionEvent::Activate);

            // Wait for input, announcing timer completions in between.
            let input = loop {
                tokio::select! {
                    fired = next_timer_event(&mut timer_events) => {
                        match fired {
                            Some(f) => self.announce_timer(&f).await,
                            None => timer_events = None,
                        }
                    }
                    next = source.next_utterance() => break next?,
                }
            };
            let Some(input) = input else {
                self.apply(SessionEvent::Interrupt);
                break;
            };

            let Some(text) = self.capture_text(input).await else {
                // Nothing usable captured; abandon the turn.
                self.apply(SessionEvent::Interrupt);
                continue;
            };
            self.apply(SessionEvent::CaptureComplete);
            info!("captured: {text:?}");

            let cmd = fastpath::normalize_command(&text);
            if EXIT_PHRASES.contains(&cmd.as_str()) {
                self.apply(SessionEvent::RoutePassthrough);
                let token = CancellationToken::new();
                self.coordinator
                    .speak(respond::GOODBYE, &self.audio_tx, &token)
                    .await;
                self.apply(SessionEvent::PlaybackComplete);
                break;
            }
            if CANCEL_PHRASES.contains(&cmd.as_str()) {
                self.apply(SessionEvent::Interrupt);
                continue;
            }

            self.run_turn(&text).await;
        }

        if let Some(summarizer) = self.summarizer.take() {
            summarizer.shutdown().await;
        }
        Ok(())
    }

    /// Resolve raw input into text, transcribing audio when needed.
    async fn capture_text(&self, input: UserInput) -> Option<String> {
        let text = match input {
            UserInput::Text(text) => text,
            UserInput::Audio(segment) => {
                let transcriber = self.transcriber.as_ref()?;
                match transcriber.transcribe(&segment).await {
                    Ok(transcript) if !transcript.is_empty() => transcript.text,
                    Ok(_) => return None,
                    Err(e) => {
                        warn!("transcription failed: {e}");
                        return None;
                    }
                }
            }
        };
        let text = text.trim().to_owned();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// One routed turn. The session is in `Thinking` on entry and `Idle`
    /// on exit.
    async fn run_turn(&mut self, text: &str) {
        // Per-turn cancellation: the interrupter trips this token, and
        // every suspension point below observes it at chunk boundaries.
        let turn = CancellationToken::new();
        let guard = {
            let mut rx = self.interrupt_rx.clone();
            let turn = turn.clone();
            tokio::spawn(async move {
                if rx.changed().await.is_ok() {
                    turn.cancel();
                }
            })
        };

        // Fast path: skip classification entirely.
        if let Some(call) = fastpath::match_fast_path(text) {
            info!("fast path: {}", call.name);
            self.apply(SessionEvent::RouteAction);
            let result = self.executor.execute(&call).await;
            self.apply(SessionEvent::ExecutionComplete);
            let line = respond::speak_result(&result);
            self.coordinator.speak(&line, &self.audio_tx, &turn).await;
            self.finish_turn(&turn, guard);
            return;
        }

        let turns = self.history.turns();
        let outcome = tokio::select! {
            () = turn.cancelled() => None,
            outcome = self.router.route(text, &turns) => Some(outcome),
        };
        let Some(outcome) = outcome else {
            self.finish_turn(&turn, guard);
            return;
        };

        match outcome {
            RouteOutcome::Ambiguous { confidence, .. } => {
                info!("ambiguous intent (confidence {confidence:.2})");
                self.apply(SessionEvent::RoutePassthrough);
                self.coordinator
                    .speak(respond::AMBIGUOUS_RESPONSE, &self.audio_tx, &turn)
                    .await;
            }
            RouteOutcome::Routed(Intent::Action { call, .. }) => {
                self.apply(SessionEvent::RouteAction);
                let result = tokio::select! {
                    () = turn.cancelled() => None,
                    result = self.executor.execute(&call) => Some(result),
                };
                self.apply(SessionEvent::ExecutionComplete);
                if let Some(result) = result {
                    self.log_failure(&call.name, &result);
                    let line = respond::speak_result(&result);
                    self.coordinator.speak(&line, &self.audio_tx, &turn).await;
                }
            }
            RouteOutcome::Routed(Intent::SystemQuery { .. }) => {
                self.apply(SessionEvent::RouteAction);
                let snapshot = tokio::select! {
                    () = turn.cancelled() => None,
                    snapshot = self.executor.registry().snapshot() => Some(snapshot),
                };
                self.apply(SessionEvent::ExecutionComplete);
                if let Some(snapshot) = snapshot {
                    let line = snapshot.spoken_summary();
                    self.coordinator.speak(&line, &self.audio_tx, &turn).await;
                }
            }
            RouteOutcome::Routed(Intent::Passthrough { mode, .. }) => {
                self.apply(SessionEvent::RoutePassthrough);
                self.passthrough_turn(text, mode, &turn).await;
            }
        }

        self.finish_turn(&turn, guard);
    }

    /// Open-ended conversation: stream generation into synthesis.
    async fn passthrough_turn(&mut self, text: &str, mode: PassthroughMode, turn: &CancellationToken) {
        self.history.append_user(text);

        // Compress older turns in the background; a full queue means this
        // round is skipped and the turns wait for the next one.
        if let Some((previous, turns)) = self.history.compact() {
            if let Some(summarizer) = &self.summarizer {
                summarizer.try_submit(SummaryJob { previous, turns });
            }
        }

        let request = GenerationRequest {
            messages: self.history.build_context(&self.config.llm.system_prompt),
            thinking: mode == PassthroughMode::Thinking,
        };

        let (token_tx, token_rx) = mpsc::channel::<TokenChunk>(self.config.streaming.token_channel_size);
        let generation = {
            let llm = Arc::clone(&self.llm);
            let turn = turn.clone();
            tokio::spawn(async move { llm.stream(request, token_tx, &turn).await })
        };

        let streamed = self.coordinator.consume(token_rx, &self.audio_tx, turn).await;

        let generation_outcome = match generation.await {
            Ok(outcome) => outcome,
            Err(e) => Err(crate::error::AssistantError::Channel(e.to_string())),
        };

        match generation_outcome {
            Ok(_) if !streamed.text.is_empty() => {
                // Partial responses from an interruption still count as
                // what the assistant said.
                self.history.append_assistant(&streamed.text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("generation failed: {e}");
                // Drop the unanswered user turn so history stays paired.
                self.history.pop_dangling_user_turn();
                self.coordinator
                    .speak(respond::GENERATION_APOLOGY, &self.audio_tx, turn)
                    .await;
            }
        }
    }

    /// Terminal bookkeeping for a turn: stop the interrupt guard and
    /// settle in idle.
    fn finish_turn(&mut self, turn: &CancellationToken, guard: tokio::task::JoinHandle<()>) {
        guard.abort();
        if turn.is_cancelled() {
            self.apply(SessionEvent::Interrupt);
        } else if self.state == SessionState::Speaking {
            self.apply(SessionEvent::PlaybackComplete);
        } else {
            // A turn abandoned before reaching playback.
            self.apply(SessionEvent::Interrupt);
        }
    }

    /// Out-of-turn notification when a countdown finishes.
    async fn announce_timer(&self, fired: &TimerFired) {
        info!("timer finished: {}", fired.label);
        let token = CancellationToken::new();
        let line = format!("Your {} timer just finished.", fired.label);
        self.coordinator.speak(&line, &self.audio_tx, &token).await;
    }

    fn log_failure(&self, name: &str, result: &ExecutionResult) {
        if !result.is_success() {
            warn!("{name} did not complete: {result:?}");
        }
    }
}

/// Await the next timer completion; pends forever once the channel is
/// gone so the input branch stays in control.
async fn next_timer_event(
    events: &mut Option<mpsc::UnboundedReceiver<TimerFired>>,
) -> Option<TimerFired> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
