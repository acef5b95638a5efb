//! Speech-to-text seam.
//!
//! Transcription is consumed behind a trait; the HTTP implementation
//! posts WAV-encoded audio to an OpenAI-compatible transcriptions
//! endpoint. An empty transcript is a value, not an error.

use crate::config::SttConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{AudioSegment, Transcript};
use async_trait::async_trait;
use std::time::Duration;

/// Transcribes captured audio to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure; silence yields an empty
    /// transcript, not an error.
    async fn transcribe(&self, segment: &AudioSegment) -> Result<Transcript>;
}

/// Transcriber over an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct HttpTranscriber {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl HttpTranscriber {
    /// Create a transcriber client from STT configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Stt(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, segment: &AudioSegment) -> Result<Transcript> {
        let wav = encode_wav(segment);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| AssistantError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let url = format!("{}/audio/transcriptions", self.api_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout(format!("stt: {e}"))
                } else {
                    AssistantError::Stt(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| AssistantError::Stt(e.to_string()))?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Stt(format!("malformed response: {e}")))?;

        let text = payload["text"].as_str().unwrap_or_default().trim().to_owned();
        Ok(Transcript { text })
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
fn encode_wav(segment: &AudioSegment) -> Vec<u8> {
    let sample_count = segment.samples.len() as u32;
    let data_len = sample_count * 2;
    let byte_rate = segment.sample_rate * 2;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&segment.sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for sample in &segment.samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * f32::from(i16::MAX)) as i16;
        wav.extend_from_slice(&value.to_le_bytes());
    }
    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_layout() {
        let segment = AudioSegment {
            samples: vec![0.0, 0.5, -0.5, 1.0],
            sample_rate: 16_000,
        };
        let wav = encode_wav(&segment);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 8);
        // Sample rate at offset 24.
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16_000);
    }

    #[test]
    fn full_scale_samples_clamp() {
        let segment = AudioSegment {
            samples: vec![2.0, -2.0],
            sample_rate: 8_000,
        };
        let wav = encode_wav(&segment);
        let first = i16::from_le_bytes([wav[44], wav[45]]);
        let second = i16::from_le_bytes([wav[46], wav[47]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
    }
}
