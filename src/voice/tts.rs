//! Speech synthesis
//!
//! The playback queue runs on its own thread and needs a synchronous
//! synthesis call, so the OpenAI client here is a blocking one. It is built
//! lazily on first use, which keeps construction safe inside the async
//! runtime (a blocking reqwest client must not be driven from a runtime
//! thread).

use std::sync::OnceLock;

use serde::Serialize;

use crate::{Error, Result};

/// Turns a text segment into playable audio bytes
pub trait Synthesizer: Send + Sync {
    /// Synthesize one segment to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// OpenAI text-to-speech backend
pub struct OpenAiSynthesizer {
    client: OnceLock<reqwest::blocking::Client>,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
}

impl OpenAiSynthesizer {
    /// Create a new synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String, voice: String, speed: f32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for speech synthesis".to_string(),
            ));
        }

        Ok(Self {
            client: OnceLock::new(),
            api_key,
            model,
            voice,
            speed,
        })
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(reqwest::blocking::Client::new)
    }
}

impl Synthesizer for OpenAiSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), "synthesizing segment");

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client()
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "synthesis request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "synthesis API error");
            return Err(Error::Tts(format!("synthesis API error {status}: {body}")));
        }

        let bytes = response.bytes()?;
        tracing::debug!(audio_bytes = bytes.len(), "synthesis complete");
        Ok(bytes.to_vec())
    }
}
