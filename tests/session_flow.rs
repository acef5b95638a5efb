#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Session loop integration: scripted input through routing, execution,
//! and streaming speech, with interruption settling back to idle.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tsuzi::classifier::{IntentClassifier, RawIntentPayload};
use tsuzi::config::AssistantConfig;
use tsuzi::executor::{AppLauncher, FunctionExecutor};
use tsuzi::history::Turn;
use tsuzi::llm::{GenerationRequest, LanguageBackend};
use tsuzi::pipeline::messages::{SynthesizedAudio, TokenChunk};
use tsuzi::registry::ManagerRegistry;
use tsuzi::search::SearchClient;
use tsuzi::session::{InputSource, Session, SessionState, UserInput};
use tsuzi::tts::Synthesizer;
use tsuzi::Result;

/// Input source replaying a fixed script, then closing.
struct ScriptedSource {
    inputs: VecDeque<UserInput>,
}

impl ScriptedSource {
    fn text(lines: &[&str]) -> Self {
        Self {
            inputs: lines
                .iter()
                .map(|l| UserInput::Text((*l).to_owned()))
                .collect(),
        }
    }
}

#[async_trait]
impl InputSource for ScriptedSource {
    async fn next_utterance(&mut self) -> Result<Option<UserInput>> {
        Ok(self.inputs.pop_front())
    }
}

/// Classifier replaying one payload per call.
struct ScriptedClassifier {
    payloads: std::sync::Mutex<VecDeque<String>>,
    calls: AtomicU32,
}

impl ScriptedClassifier {
    fn new(payloads: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            payloads: std::sync::Mutex::new(
                payloads.iter().map(|p| (*p).to_owned()).collect(),
            ),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(&self, _text: &str, _context: &[Turn]) -> Result<RawIntentPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .payloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "call:nonthinking".to_owned());
        Ok(RawIntentPayload {
            content,
            confidence: 1.0,
        })
    }
}

/// Backend that streams a fixed reply token by token.
struct ScriptedBackend {
    tokens: Vec<String>,
    token_delay: Duration,
}

impl ScriptedBackend {
    fn reply(text: &str) -> Arc<Self> {
        Arc::new(Self {
            tokens: text
                .split_inclusive(' ')
                .map(str::to_owned)
                .collect(),
            token_delay: Duration::from_millis(1),
        })
    }

    /// A reply that keeps streaming until cancelled.
    fn endless() -> Arc<Self> {
        Arc::new(Self {
            tokens: Vec::new(),
            token_delay: Duration::from_millis(5),
        })
    }
}

#[async_trait]
impl LanguageBackend for ScriptedBackend {
    async fn stream(
        &self,
        _request: GenerationRequest,
        tx: mpsc::Sender<TokenChunk>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if self.tokens.is_empty() {
            // Endless mode: emit filler until cancelled.
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return Ok(true),
                    () = tokio::time::sleep(self.token_delay) => {
                        if tx.send(TokenChunk { text: "still talking ".into() }).await.is_err() {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        for token in &self.tokens {
            tokio::select! {
                () = cancel.cancelled() => return Ok(true),
                () = tokio::time::sleep(self.token_delay) => {}
            }
            if tx
                .send(TokenChunk {
                    text: token.clone(),
                })
                .await
                .is_err()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn complete(&self, _model: &str, _prompt: &str) -> Result<String> {
        Ok("a short summary".to_owned())
    }
}

/// Synthesizer echoing text bytes so the audio stream is assertable.
struct EchoSynth;

#[async_trait]
impl Synthesizer for EchoSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

struct NoopLauncher;

impl AppLauncher for NoopLauncher {
    fn launch_app(&self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn open_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    session: Session,
    audio_rx: mpsc::Receiver<SynthesizedAudio>,
    executor: Arc<FunctionExecutor>,
    _data_dir: TempDir,
}

fn harness(classifier: Arc<dyn IntentClassifier>, llm: Arc<dyn LanguageBackend>) -> Harness {
    let data_dir = TempDir::new().unwrap();
    let mut config = AssistantConfig::default();
    config.managers.data_dir = data_dir.path().to_path_buf();

    let registry = Arc::new(ManagerRegistry::new(config.managers.clone(), None));
    let search = SearchClient::new(&config.managers.search).unwrap();
    let executor = Arc::new(FunctionExecutor::new(
        registry,
        search,
        Arc::new(NoopLauncher),
    ));
    let (audio_tx, audio_rx) = mpsc::channel(64);
    let session = Session::new(
        config,
        classifier,
        llm,
        Arc::new(EchoSynth),
        Arc::clone(&executor),
        audio_tx,
    );

    Harness {
        session,
        audio_rx,
        executor,
        _data_dir: data_dir,
    }
}

fn drain_states(rx: &mut tokio::sync::broadcast::Receiver<SessionState>) -> Vec<SessionState> {
    let mut states = Vec::new();
    while let Ok(state) = rx.try_recv() {
        states.push(state);
    }
    states
}

#[tokio::test]
async fn timer_command_reaches_speaking_with_confirmation() {
    let classifier = ScriptedClassifier::new(&["call:set_timer{duration:<escape>10 minutes<escape>}"]);
    let mut h = harness(classifier, ScriptedBackend::reply("unused"));
    let mut states = h.session.state_events();

    let mut source = ScriptedSource::text(&["Set a timer for 10 minutes"]);
    tokio::time::timeout(Duration::from_secs(5), h.session.run(&mut source))
        .await
        .expect("session should finish")
        .unwrap();

    let timers = h.executor.registry().timers().unwrap();
    let active = timers.active();
    assert_eq!(active.len(), 1);
    assert!(active[0].remaining <= Duration::from_secs(600));

    let observed = drain_states(&mut states);
    assert!(observed.contains(&SessionState::Acting), "{observed:?}");
    assert!(observed.contains(&SessionState::Speaking), "{observed:?}");
    assert_eq!(observed.last(), Some(&SessionState::Idle));

    let chunk = h.audio_rx.recv().await.unwrap();
    let spoken = String::from_utf8(chunk.audio).unwrap();
    assert!(spoken.contains("10 minutes"), "{spoken}");
}

#[tokio::test]
async fn passthrough_streams_reply_and_records_history() {
    let classifier = ScriptedClassifier::new(&["call:nonthinking{prompt:<escape>hi<escape>}"]);
    let mut h = harness(classifier, ScriptedBackend::reply("Hello there. Nice to meet you."));
    let mut source = ScriptedSource::text(&["hello!"]);

    tokio::time::timeout(Duration::from_secs(5), h.session.run(&mut source))
        .await
        .expect("session should finish")
        .unwrap();

    let turns = h.session.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text, "hello!");
    assert!(turns[1].text.contains("Nice to meet you"));

    // Audio chunks arrive in sentence order.
    let first = h.audio_rx.recv().await.unwrap();
    assert!(String::from_utf8(first.audio).unwrap().contains("Hello there."));
}

#[tokio::test]
async fn interruption_settles_back_to_idle_within_bounds() {
    let classifier = ScriptedClassifier::new(&["call:nonthinking{prompt:<escape>x<escape>}"]);
    let mut h = harness(classifier, ScriptedBackend::endless());
    let interrupter = h.session.interrupter();
    let mut states = h.session.state_events();

    // Drain audio so the endless reply never backpressures the turn.
    tokio::spawn(async move { while h.audio_rx.recv().await.is_some() {} });

    let interrupt = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        interrupter.interrupt();
    });

    let mut source = ScriptedSource::text(&["talk forever please"]);
    tokio::time::timeout(Duration::from_secs(5), h.session.run(&mut source))
        .await
        .expect("interruption must settle the session within bounds")
        .unwrap();
    interrupt.await.unwrap();

    let observed = drain_states(&mut states);
    assert_eq!(observed.last(), Some(&SessionState::Idle));
}

#[tokio::test]
async fn cancellation_phrase_skips_routing_entirely() {
    let classifier = ScriptedClassifier::new(&[]);
    let mut h = harness(Arc::clone(&classifier) as Arc<dyn IntentClassifier>, ScriptedBackend::reply("unused"));
    let mut source = ScriptedSource::text(&["never mind"]);

    tokio::time::timeout(Duration::from_secs(5), h.session.run(&mut source))
        .await
        .expect("session should finish")
        .unwrap();

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn exit_phrase_says_goodbye_and_ends_the_session() {
    let classifier = ScriptedClassifier::new(&[]);
    let mut h = harness(classifier, ScriptedBackend::reply("unused"));
    let mut source = ScriptedSource::text(&["exit", "this is never read"]);

    tokio::time::timeout(Duration::from_secs(5), h.session.run(&mut source))
        .await
        .expect("session should finish")
        .unwrap();

    let chunk = h.audio_rx.recv().await.unwrap();
    assert_eq!(String::from_utf8(chunk.audio).unwrap(), "Goodbye!");
}

#[tokio::test]
async fn fast_path_bypasses_the_classifier() {
    let classifier = ScriptedClassifier::new(&[]);
    let mut h = harness(Arc::clone(&classifier) as Arc<dyn IntentClassifier>, ScriptedBackend::reply("unused"));
    let mut source = ScriptedSource::text(&["open firefox"]);

    tokio::time::timeout(Duration::from_secs(5), h.session.run(&mut source))
        .await
        .expect("session should finish")
        .unwrap();

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    let chunk = h.audio_rx.recv().await.unwrap();
    assert!(String::from_utf8(chunk.audio).unwrap().contains("firefox"));
}
