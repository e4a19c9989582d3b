//! Utterance capture and wake word recognition
//!
//! Watches the microphone for energy above an (optionally calibrated)
//! threshold, captures one utterance bounded by trailing silence, and hands
//! it to the transcription API. Wake word matching is plain substring
//! matching on the transcript, which tolerates punctuation and casing from
//! the STT service.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::RecognitionSection;
use crate::voice::capture::{rms, samples_to_wav, AudioCapture, SAMPLE_RATE};
use crate::voice::stt::SpeechToText;
use crate::Result;

/// Poll interval for draining the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Multiplier applied to ambient noise during calibration
const AMBIENT_MARGIN: f32 = 1.8;

/// Why a listen attempt produced no command
#[derive(Debug, Error)]
pub enum RecognitionFailure {
    /// No speech began within the wait window
    #[error("timed out waiting for speech")]
    Timeout,

    /// Speech was captured but transcribed to nothing
    #[error("could not understand the audio")]
    Unintelligible,

    /// The transcription service failed
    #[error("transcription service error: {0}")]
    Service(String),
}

/// Result of one wake word listening pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    /// A wake word was heard, possibly with a command bundled after it
    Detected { command: Option<String> },
    /// Nothing relevant was heard
    NotDetected,
}

/// Captures utterances and matches wake words
pub struct Recognizer {
    capture: AudioCapture,
    stt: SpeechToText,
    settings: RecognitionSection,
    wake_words: Vec<String>,
    energy_threshold: f32,
}

impl Recognizer {
    /// Open the microphone and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be opened
    pub fn new(
        stt: SpeechToText,
        settings: RecognitionSection,
        wake_words: Vec<String>,
    ) -> Result<Self> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;

        let energy_threshold = settings.energy_threshold;
        Ok(Self {
            capture,
            stt,
            settings,
            wake_words,
            energy_threshold,
        })
    }

    /// Measure ambient noise and raise the energy threshold above it
    ///
    /// No-op unless dynamic thresholding is enabled.
    pub async fn calibrate(&mut self) {
        if !self.settings.dynamic_energy_threshold {
            return;
        }

        self.capture.clear();
        tokio::time::sleep(Duration::from_secs_f32(self.settings.calibration_secs)).await;
        let ambient = rms(&self.capture.drain());

        let calibrated = ambient * AMBIENT_MARGIN;
        if calibrated > self.energy_threshold {
            self.energy_threshold = calibrated;
        }

        tracing::info!(
            ambient = ambient,
            threshold = self.energy_threshold,
            "microphone calibrated"
        );
    }

    /// Listen for one command utterance and transcribe it
    ///
    /// # Errors
    ///
    /// Returns a [`RecognitionFailure`] when nothing usable was heard
    pub async fn listen(&mut self) -> std::result::Result<String, RecognitionFailure> {
        let wait = Duration::from_secs_f32(self.settings.operation_timeout_secs);
        let samples = self.capture_utterance(wait).await?;

        let wav = samples_to_wav(&samples, SAMPLE_RATE)
            .map_err(|e| RecognitionFailure::Service(e.to_string()))?;

        let transcript = self
            .stt
            .transcribe(&wav)
            .await
            .map_err(|e| RecognitionFailure::Service(e.to_string()))?;

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(RecognitionFailure::Unintelligible);
        }

        Ok(transcript)
    }

    /// One wake word pass: listen, then match
    ///
    /// Recognition failures are routine while dormant (silence times out
    /// constantly), so they map to [`WakeOutcome::NotDetected`].
    pub async fn detect_wake_word(&mut self) -> WakeOutcome {
        let transcript = match self.listen().await {
            Ok(t) => t,
            Err(RecognitionFailure::Timeout | RecognitionFailure::Unintelligible) => {
                return WakeOutcome::NotDetected;
            }
            Err(e) => {
                tracing::warn!(error = %e, "wake word pass failed");
                return WakeOutcome::NotDetected;
            }
        };

        let lowered = transcript.to_lowercase();
        if !contains_wake_word(&lowered, &self.wake_words) {
            tracing::debug!(transcript = %transcript, "no wake word");
            return WakeOutcome::NotDetected;
        }

        let command = extract_command(&lowered, &self.wake_words);
        tracing::info!(transcript = %transcript, command = ?command, "wake word detected");
        WakeOutcome::Detected { command }
    }

    /// Capture one energy-bounded utterance
    ///
    /// Waits up to `wait` for speech to begin, then collects until the
    /// trailing pause or the phrase time cap.
    async fn capture_utterance(
        &mut self,
        wait: Duration,
    ) -> std::result::Result<Vec<f32>, RecognitionFailure> {
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let to_samples =
            |secs: f32| -> usize { (secs.max(0.0) * SAMPLE_RATE as f32) as usize };

        let pause_limit = to_samples(self.settings.pause_secs);
        let phrase_min = to_samples(self.settings.phrase_min_secs);
        let phrase_cap = to_samples(self.settings.phrase_time_limit_secs);

        self.capture.clear();

        let mut utterance: Vec<f32> = Vec::new();
        let mut speech_started = false;
        let mut speech_samples = 0usize;
        let mut trailing_silence = 0usize;
        let start = Instant::now();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let chunk = self.capture.drain();

            if chunk.is_empty() {
                if !speech_started && start.elapsed() > wait {
                    return Err(RecognitionFailure::Timeout);
                }
                continue;
            }

            let energy = rms(&chunk);

            if energy >= self.energy_threshold {
                speech_started = true;
                speech_samples += chunk.len();
                trailing_silence = 0;
                utterance.extend(chunk);
            } else if speech_started {
                trailing_silence += chunk.len();
                utterance.extend(chunk);

                if trailing_silence >= pause_limit && speech_samples >= phrase_min {
                    break;
                }
            } else if start.elapsed() > wait {
                return Err(RecognitionFailure::Timeout);
            }

            if utterance.len() >= phrase_cap {
                tracing::debug!("phrase time cap reached");
                break;
            }
        }

        if speech_samples < phrase_min {
            return Err(RecognitionFailure::Unintelligible);
        }

        tracing::debug!(
            samples = utterance.len(),
            speech_samples = speech_samples,
            "utterance captured"
        );
        Ok(utterance)
    }
}

/// Whether any wake word occurs in the lowercased transcript
#[must_use]
pub fn contains_wake_word(transcript: &str, wake_words: &[String]) -> bool {
    wake_words.iter().any(|w| transcript.contains(w.as_str()))
}

/// Extract the command bundled after the first wake word occurrence
///
/// Returns `None` when the transcript is only the wake word.
#[must_use]
pub fn extract_command(transcript: &str, wake_words: &[String]) -> Option<String> {
    for wake_word in wake_words {
        if let Some(idx) = transcript.find(wake_word.as_str()) {
            let after = &transcript[idx + wake_word.len()..];
            let command = after
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ':' | ';'))
                .trim_end()
                .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'));

            if command.is_empty() {
                return None;
            }
            return Some(command.to_string());
        }
    }
    None
}
