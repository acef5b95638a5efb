//! Message types passed between pipeline stages.

/// A captured utterance, ready for transcription.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Mono f32 samples in `[-1, 1]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

/// A transcription result from the STT seam.
///
/// An empty `text` is a legal value (silence, noise-only capture); the
/// session skips the turn rather than treating it as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
}

impl Transcript {
    /// Whether the transcript carries no usable text.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A single token emitted by the generation backend during streaming.
#[derive(Debug, Clone)]
pub struct TokenChunk {
    /// Decoded text fragment.
    pub text: String,
}

/// Synthesized audio ready for playback.
///
/// Chunks are emitted strictly in the order their source tokens were
/// generated; the playback side never reorders.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Encoded audio bytes from the synthesis seam.
    pub audio: Vec<u8>,
    /// Whether this is the last chunk of the current response.
    pub is_final: bool,
}
