//! TOML configuration file schema
//!
//! The config file is required at startup; every field carries a default so a
//! minimal file (even an empty one) still yields a working assistant. The
//! dispatch tables (`applications`, `urls`, `power`) default to empty, which
//! disables the corresponding command families.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Assistant identity
    #[serde(default)]
    pub assistant: AssistantSection,

    /// Microphone and recognition tuning
    #[serde(default)]
    pub recognition: RecognitionSection,

    /// Speech synthesis and playback
    #[serde(default)]
    pub voice: VoiceSection,

    /// Active-session lifecycle limits
    #[serde(default)]
    pub session: SessionSection,

    /// Language model fallback
    #[serde(default)]
    pub model: ModelSection,

    /// Conversation memory
    #[serde(default)]
    pub memory: MemorySection,

    /// Launchable applications, grouped by category (e.g. `[applications.media]`)
    #[serde(default)]
    pub applications: HashMap<String, HashMap<String, String>>,

    /// Named websites for the open-target family
    #[serde(default)]
    pub urls: HashMap<String, String>,

    /// Media player integration
    #[serde(default)]
    pub media: MediaSection,

    /// Named power commands (e.g. `shutdown = "shutdown -h now"`)
    #[serde(default)]
    pub power: HashMap<String, String>,

    /// Canned spoken responses, keyed by category
    #[serde(default)]
    pub responses: ResponsesSection,
}

/// Assistant identity
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    /// Spoken name of the assistant
    #[serde(default = "default_name")]
    pub name: String,

    /// Phrases that activate the assistant (lowercased at load)
    #[serde(default = "default_wake_words")]
    pub wake_words: Vec<String>,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            wake_words: default_wake_words(),
        }
    }
}

/// Microphone and recognition tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionSection {
    /// RMS energy floor for speech detection
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,

    /// Raise the threshold above measured ambient noise at startup
    #[serde(default = "default_true")]
    pub dynamic_energy_threshold: bool,

    /// Trailing silence that ends an utterance
    #[serde(default = "default_pause_secs")]
    pub pause_secs: f32,

    /// Minimum speech length for a segment to count as an utterance
    #[serde(default = "default_phrase_min_secs")]
    pub phrase_min_secs: f32,

    /// Give up waiting for speech to start after this long
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: f32,

    /// Hard cap on a single utterance
    #[serde(default = "default_phrase_time_limit_secs")]
    pub phrase_time_limit_secs: f32,

    /// Ambient noise sampling window at startup
    #[serde(default = "default_calibration_secs")]
    pub calibration_secs: f32,
}

impl Default for RecognitionSection {
    fn default() -> Self {
        Self {
            energy_threshold: default_energy_threshold(),
            dynamic_energy_threshold: true,
            pause_secs: default_pause_secs(),
            phrase_min_secs: default_phrase_min_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            phrase_time_limit_secs: default_phrase_time_limit_secs(),
            calibration_secs: default_calibration_secs(),
        }
    }
}

/// Speech synthesis and playback
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSection {
    /// Output volume multiplier (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// STT model (e.g. "whisper-1")
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// TTS voice identifier (e.g. "alloy")
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,

    /// TTS speed multiplier
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f32,

    /// Directory for transient per-segment audio files
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            stt_model: default_stt_model(),
            tts_model: default_tts_model(),
            tts_voice: default_tts_voice(),
            tts_speed: default_tts_speed(),
            scratch_dir: None,
        }
    }
}

/// Active-session lifecycle limits
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Commands served per activation before returning to dormant
    #[serde(default = "default_command_budget")]
    pub command_budget: u32,

    /// Session lifetime in seconds, measured from activation
    #[serde(default = "default_session_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds of silence before an active session goes back to dormant
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Consecutive recognition failures before returning to dormant
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            command_budget: default_command_budget(),
            timeout_secs: default_session_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_failures: default_max_failures(),
        }
    }
}

/// Language model fallback
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Response length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Recent conversation turns included per request
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// System prompt (the assistant name is interpolated for `{name}`)
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_turns: default_context_turns(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Conversation memory
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// Turns retained in the rolling history
    #[serde(default = "default_max_history")]
    pub max_history_length: usize,

    /// History file path; defaults to the platform data directory
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_history_length: default_max_history(),
            history_file: None,
        }
    }
}

/// Media player integration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSection {
    /// Player executable path; when unset, media commands are disabled
    #[serde(default)]
    pub player_path: Option<String>,

    /// Process name used for liveness checks
    #[serde(default = "default_media_process")]
    pub process_name: String,

    /// Window title fragment used for focus
    #[serde(default = "default_media_process")]
    pub window_title: String,

    /// Seconds to wait for the player to come up after launch
    #[serde(default = "default_launch_wait_secs")]
    pub launch_wait_secs: u64,

    /// Focus attempts before giving up
    #[serde(default = "default_focus_retries")]
    pub focus_retries: u32,

    /// Keyboard shortcuts, keyed by action name (overrides built-in defaults)
    #[serde(default)]
    pub hotkeys: HashMap<String, String>,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            player_path: None,
            process_name: default_media_process(),
            window_title: default_media_process(),
            launch_wait_secs: default_launch_wait_secs(),
            focus_retries: default_focus_retries(),
            hotkeys: HashMap::new(),
        }
    }
}

/// Canned spoken responses, keyed by category
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesSection {
    #[serde(default = "default_greetings")]
    pub greetings: Vec<String>,

    #[serde(default = "default_goodbyes")]
    pub goodbyes: Vec<String>,

    #[serde(default = "default_acknowledgments")]
    pub acknowledgments: Vec<String>,

    #[serde(default = "default_errors")]
    pub errors: Vec<String>,

    #[serde(default = "default_mute")]
    pub mute: Vec<String>,

    #[serde(default = "default_unmute")]
    pub unmute: Vec<String>,

    #[serde(default = "default_sleep")]
    pub sleep: Vec<String>,
}

impl Default for ResponsesSection {
    fn default() -> Self {
        Self {
            greetings: default_greetings(),
            goodbyes: default_goodbyes(),
            acknowledgments: default_acknowledgments(),
            errors: default_errors(),
            mute: default_mute(),
            unmute: default_unmute(),
            sleep: default_sleep(),
        }
    }
}

fn default_name() -> String {
    "Vesper".to_string()
}

fn default_wake_words() -> Vec<String> {
    vec!["vesper".to_string()]
}

const fn default_energy_threshold() -> f32 {
    0.01
}

const fn default_true() -> bool {
    true
}

const fn default_pause_secs() -> f32 {
    0.8
}

const fn default_phrase_min_secs() -> f32 {
    0.3
}

const fn default_operation_timeout_secs() -> f32 {
    30.0
}

const fn default_phrase_time_limit_secs() -> f32 {
    15.0
}

const fn default_calibration_secs() -> f32 {
    1.0
}

const fn default_volume() -> f32 {
    0.8
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

const fn default_tts_speed() -> f32 {
    1.0
}

const fn default_command_budget() -> u32 {
    3
}

const fn default_session_timeout_secs() -> u64 {
    20
}

const fn default_idle_timeout_secs() -> u64 {
    30
}

const fn default_max_failures() -> u32 {
    3
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    512
}

const fn default_context_turns() -> usize {
    5
}

fn default_system_prompt() -> String {
    "You are {name}, a desktop voice assistant. Your replies are spoken aloud, \
     so keep them short, conversational, and free of markdown or lists."
        .to_string()
}

const fn default_max_history() -> usize {
    10
}

fn default_media_process() -> String {
    "spotify".to_string()
}

const fn default_launch_wait_secs() -> u64 {
    15
}

const fn default_focus_retries() -> u32 {
    3
}

fn default_greetings() -> Vec<String> {
    vec![
        "Yes?".to_string(),
        "How can I help?".to_string(),
        "I'm listening.".to_string(),
        "At your service.".to_string(),
    ]
}

fn default_goodbyes() -> Vec<String> {
    vec![
        "Goodbye!".to_string(),
        "See you later.".to_string(),
        "Shutting down. Take care.".to_string(),
    ]
}

fn default_acknowledgments() -> Vec<String> {
    vec![
        "Let me think about that.".to_string(),
        "One moment.".to_string(),
        "Working on it.".to_string(),
    ]
}

fn default_errors() -> Vec<String> {
    vec![
        "Sorry, something went wrong.".to_string(),
        "I couldn't get an answer for that.".to_string(),
    ]
}

fn default_mute() -> Vec<String> {
    vec!["Muting.".to_string()]
}

fn default_unmute() -> Vec<String> {
    vec![
        "I'm back.".to_string(),
        "Speech restored.".to_string(),
    ]
}

fn default_sleep() -> Vec<String> {
    vec![
        "Going offline.".to_string(),
        "As you wish.".to_string(),
        "Standing by.".to_string(),
    ]
}
