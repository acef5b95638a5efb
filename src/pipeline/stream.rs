//! Token-to-speech streaming coordinator.
//!
//! One bounded single-producer/single-consumer channel per turn: the
//! generation backend produces [`TokenChunk`]s, this coordinator is the
//! sole consumer. Tokens accumulate into sentences; each sentence is
//! synthesized and forwarded strictly in generation order, so audio is
//! never reordered or interleaved across turns. Cancellation is observed
//! at every chunk boundary.

use crate::config::StreamingConfig;
use crate::error::Result;
use crate::pipeline::messages::{SynthesizedAudio, TokenChunk};
use crate::tts::Synthesizer;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Outcome of consuming one turn's token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedResponse {
    /// Full accumulated response text (possibly partial on interruption).
    pub text: String,
    /// The stream was cut short by cancellation.
    pub interrupted: bool,
}

/// Pipes generated tokens into speech synthesis.
pub struct StreamingCoordinator {
    synth: Arc<dyn Synthesizer>,
    enabled: bool,
    max_sentence_chars: usize,
}

impl StreamingCoordinator {
    /// Create a coordinator over the given synthesizer.
    pub fn new(synth: Arc<dyn Synthesizer>, config: &StreamingConfig) -> Self {
        Self {
            synth,
            enabled: config.enabled,
            max_sentence_chars: config.max_sentence_chars.max(1),
        }
    }

    /// Consume a turn's token stream, synthesizing as sentences complete.
    ///
    /// When streaming is disabled the full response is collected first and
    /// synthesized once. Either way the accumulated text is returned so
    /// the session can record the assistant turn.
    pub async fn consume(
        &self,
        mut tokens: mpsc::Receiver<TokenChunk>,
        audio_tx: &mpsc::Sender<SynthesizedAudio>,
        cancel: &CancellationToken,
    ) -> StreamedResponse {
        let mut full = String::new();
        let mut buffer = String::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    return StreamedResponse {
                        text: full,
                        interrupted: true,
                    };
                }
                token = tokens.recv() => {
                    let Some(token) = token else { break };
                    full.push_str(&token.text);
                    if !self.enabled {
                        continue;
                    }
                    buffer.push_str(&token.text);
                    if sentence_complete(&buffer, self.max_sentence_chars) {
                        let sentence = std::mem::take(&mut buffer);
                        if self
                            .emit(&sentence, false, audio_tx, cancel)
                            .await
                            .is_interrupted()
                        {
                            return StreamedResponse {
                                text: full,
                                interrupted: true,
                            };
                        }
                    }
                }
            }
        }

        // Final flush: remaining buffered text in streaming mode, or the
        // whole response otherwise.
        let tail = if self.enabled { buffer } else { full.clone() };
        if self.emit(&tail, true, audio_tx, cancel).await.is_interrupted() {
            return StreamedResponse {
                text: full,
                interrupted: true,
            };
        }

        StreamedResponse {
            text: full,
            interrupted: false,
        }
    }

    /// Synthesize and emit a fixed piece of text (action confirmations,
    /// apologies). Returns `true` when interrupted before completion.
    pub async fn speak(
        &self,
        text: &str,
        audio_tx: &mpsc::Sender<SynthesizedAudio>,
        cancel: &CancellationToken,
    ) -> bool {
        self.emit(text, true, audio_tx, cancel).await.is_interrupted()
    }

    async fn emit(
        &self,
        text: &str,
        is_final: bool,
        audio_tx: &mpsc::Sender<SynthesizedAudio>,
        cancel: &CancellationToken,
    ) -> EmitOutcome {
        let audio = if text.trim().is_empty() {
            Vec::new()
        } else {
            match self.synthesize_checked(text, cancel).await {
                Ok(Some(audio)) => audio,
                Ok(None) => return EmitOutcome::Interrupted,
                Err(e) => {
                    // Synthesis failure degrades to silence; the response
                    // text still reaches the user.
                    warn!("synthesis failed: {e}");
                    Vec::new()
                }
            }
        };

        let chunk = SynthesizedAudio { audio, is_final };
        tokio::select! {
            () = cancel.cancelled() => EmitOutcome::Interrupted,
            sent = audio_tx.send(chunk) => {
                if sent.is_err() {
                    EmitOutcome::Interrupted
                } else {
                    EmitOutcome::Sent
                }
            }
        }
    }

    async fn synthesize_checked(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        tokio::select! {
            () = cancel.cancelled() => Ok(None),
            audio = self.synth.synthesize(text) => audio.map(Some),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitOutcome {
    Sent,
    Interrupted,
}

impl EmitOutcome {
    fn is_interrupted(self) -> bool {
        self == Self::Interrupted
    }
}

/// A buffer is ready for synthesis at terminal punctuation or once it
/// grows past the configured flush length.
fn sentence_complete(buffer: &str, max_chars: usize) -> bool {
    let trimmed = buffer.trim_end();
    trimmed.ends_with(['.', '!', '?']) || buffer.len() > max_chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::Synthesizer;
    use async_trait::async_trait;

    /// Synthesizer that returns the input text as bytes, so tests can
    /// assert ordering from the emitted audio.
    struct EchoSynth;

    #[async_trait]
    impl Synthesizer for EchoSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
    }

    fn coordinator(enabled: bool) -> StreamingCoordinator {
        StreamingCoordinator::new(
            Arc::new(EchoSynth),
            &StreamingConfig {
                enabled,
                token_channel_size: 8,
                max_sentence_chars: 100,
            },
        )
    }

    async fn feed(tokens: &[&str]) -> mpsc::Receiver<TokenChunk> {
        let (tx, rx) = mpsc::channel(16);
        for t in tokens {
            tx.send(TokenChunk {
                text: (*t).to_owned(),
            })
            .await
            .unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn sentences_emit_in_generation_order() {
        let rx = feed(&["Hello", " there.", " How", " are you?"]).await;
        let (audio_tx, mut audio_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let response = coordinator(true).consume(rx, &audio_tx, &cancel).await;
        assert!(!response.interrupted);
        assert_eq!(response.text, "Hello there. How are you?");

        let first = audio_rx.recv().await.unwrap();
        assert_eq!(first.audio, b"Hello there.");
        assert!(!first.is_final);
        let second = audio_rx.recv().await.unwrap();
        assert_eq!(second.audio, b" How are you?");
        assert!(second.is_final);
    }

    #[tokio::test]
    async fn non_streaming_collects_then_synthesizes_once() {
        let rx = feed(&["One.", " Two.", " Three."]).await;
        let (audio_tx, mut audio_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let response = coordinator(false).consume(rx, &audio_tx, &cancel).await;
        assert_eq!(response.text, "One. Two. Three.");

        let only = audio_rx.recv().await.unwrap();
        assert_eq!(only.audio, b"One. Two. Three.");
        assert!(only.is_final);
        assert!(audio_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_at_chunk_boundary() {
        let (tx, rx) = mpsc::channel(16);
        let (audio_tx, mut audio_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tx.send(TokenChunk {
            text: "Partial.".to_owned(),
        })
        .await
        .unwrap();

        let coord = coordinator(true);
        let consume = tokio::spawn({
            let audio_tx = audio_tx.clone();
            let cancel = cancel.clone();
            async move { coord.consume(rx, &audio_tx, &cancel).await }
        });

        // First sentence flushes, then the turn is interrupted.
        let first = audio_rx.recv().await.unwrap();
        assert_eq!(first.audio, b"Partial.");
        cancel.cancel();
        drop(tx);

        let response = consume.await.unwrap();
        assert!(response.interrupted);
        assert!(audio_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn long_buffer_flushes_without_punctuation() {
        let long = "a".repeat(120);
        let rx = feed(&[&long]).await;
        let (audio_tx, mut audio_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        coordinator(true).consume(rx, &audio_tx, &cancel).await;
        let first = audio_rx.recv().await.unwrap();
        assert_eq!(first.audio.len(), 120);
        assert!(!first.is_final);
    }

    #[tokio::test]
    async fn speak_emits_single_final_chunk() {
        let (audio_tx, mut audio_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let interrupted = coordinator(true)
            .speak("Timer set.", &audio_tx, &cancel)
            .await;
        assert!(!interrupted);
        let chunk = audio_rx.recv().await.unwrap();
        assert_eq!(chunk.audio, b"Timer set.");
        assert!(chunk.is_final);
    }
}
