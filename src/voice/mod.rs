//! Voice processing: capture, recognition, synthesis, and playback

pub mod capture;
pub mod playback;
pub mod queue;
pub mod recognizer;
pub mod stt;
pub mod tts;

pub use capture::{rms, samples_to_wav, AudioCapture, SAMPLE_RATE};
pub use playback::{AudioSink, CpalSink};
pub use queue::{split_sentences, SpeechItem, SpeechQueue};
pub use recognizer::{
    contains_wake_word, extract_command, RecognitionFailure, Recognizer, WakeOutcome,
};
pub use stt::SpeechToText;
pub use tts::{OpenAiSynthesizer, Synthesizer};
