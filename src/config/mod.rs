//! Configuration loading
//!
//! Settings come from a required TOML file (`--config` or
//! `~/.config/vesper/config.toml`), with API keys taken from the
//! environment. A missing or unparsable config file is a startup error.

mod file;

use std::path::{Path, PathBuf};

pub use file::{
    AssistantSection, ConfigFile, MediaSection, MemorySection, ModelSection, RecognitionSection,
    ResponsesSection, SessionSection, VoiceSection,
};

use crate::{Error, Result};

/// Environment variable holding the OpenAI key used for STT and TTS
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// Environment variable holding the chat-completion API key
pub const MODEL_KEY_VAR: &str = "VESPER_MODEL_API_KEY";

/// Resolved runtime configuration
#[derive(Clone)]
pub struct Config {
    /// Parsed settings from the TOML file
    pub settings: ConfigFile,

    /// API key for speech recognition and synthesis
    pub openai_api_key: Option<String>,

    /// API key for the chat-completion fallback
    pub model_api_key: Option<String>,

    /// Resolved conversation history path
    pub history_file: PathBuf,

    /// Resolved scratch directory for per-segment audio artifacts
    pub scratch_dir: PathBuf,
}

impl std::fmt::Debug for Config {
    // Keys stay out of debug logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "***"))
            .field("history_file", &self.history_file)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

impl Config {
    /// Load configuration from the given path, or the default location
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()
                .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?,
        };

        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let settings: ConfigFile = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");

        Self::from_settings(settings)
    }

    /// Build a runtime config from already-parsed settings
    ///
    /// # Errors
    ///
    /// Returns error if the settings are internally inconsistent
    pub fn from_settings(mut settings: ConfigFile) -> Result<Self> {
        settings.assistant.wake_words = settings
            .assistant
            .wake_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if settings.assistant.wake_words.is_empty() {
            return Err(Error::Config("at least one wake word required".to_string()));
        }

        if !(0.0..=1.0).contains(&settings.voice.volume) {
            return Err(Error::Config(format!(
                "voice.volume must be in 0.0 - 1.0, got {}",
                settings.voice.volume
            )));
        }

        let history_file = match settings.memory.history_file.clone() {
            Some(p) => p,
            None => data_dir()
                .ok_or_else(|| Error::Config("could not determine data directory".to_string()))?
                .join("history.json"),
        };

        let scratch_dir = match settings.voice.scratch_dir.clone() {
            Some(p) => p,
            None => std::env::temp_dir().join("vesper-audio"),
        };

        Ok(Self {
            settings,
            openai_api_key: read_env(OPENAI_KEY_VAR),
            model_api_key: read_env(MODEL_KEY_VAR),
            history_file,
            scratch_dir,
        })
    }

    /// System prompt with the assistant name interpolated
    #[must_use]
    pub fn system_prompt(&self) -> String {
        self.settings
            .model
            .system_prompt
            .replace("{name}", &self.settings.assistant.name)
    }
}

/// Read an environment variable, treating empty values as unset
fn read_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Default config file path: `~/.config/vesper/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("vesper").join("config.toml"))
}

/// Data directory for persistent state: `~/.local/share/vesper`
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.data_dir().join("vesper"))
}
