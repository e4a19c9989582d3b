//! Rolling conversation memory
//!
//! Holds the most recent conversation turns and mirrors them to a JSON file
//! after every mutation. Persistence failures are logged and swallowed so a
//! full disk or bad path never takes the voice loop down.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ChatMessage;
use crate::{Error, Result};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics over the retained history
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStatistics {
    pub total_turns: usize,
    pub user_turns: usize,
    pub assistant_turns: usize,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

/// Bounded conversation history with write-through persistence
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
    max_history: usize,
    history_file: PathBuf,
}

impl ConversationMemory {
    /// Load history from disk, starting fresh if the file is missing or corrupt
    #[must_use]
    pub fn load(history_file: PathBuf, max_history: usize) -> Self {
        let turns = match std::fs::read_to_string(&history_file) {
            Ok(content) => match serde_json::from_str::<Vec<ConversationTurn>>(&content) {
                Ok(mut turns) => {
                    if turns.len() > max_history {
                        turns.drain(..turns.len() - max_history);
                    }
                    tracing::debug!(turns = turns.len(), "loaded conversation history");
                    turns
                }
                Err(e) => {
                    tracing::warn!(
                        path = %history_file.display(),
                        error = %e,
                        "corrupt history file, starting fresh"
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            turns,
            max_history,
            history_file,
        }
    }

    /// Append a turn, truncating the oldest past the history cap
    ///
    /// Persists immediately; a persistence failure is logged, never raised.
    pub fn add_turn(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });

        if self.turns.len() > self.max_history {
            let excess = self.turns.len() - self.max_history;
            self.turns.drain(..excess);
        }

        self.persist();
    }

    /// The most recent turns, oldest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// All retained turns, oldest first
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Recent turns reshaped as chat messages for a model request
    #[must_use]
    pub fn messages_for_model(&self, limit: usize) -> Vec<ChatMessage> {
        self.recent(limit)
            .iter()
            .map(|t| ChatMessage {
                role: t.role.to_string(),
                content: t.content.clone(),
            })
            .collect()
    }

    /// Drop all history, on disk too
    pub fn clear(&mut self) {
        self.turns.clear();
        self.persist();
    }

    /// Case-insensitive substring search over turn contents
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&ConversationTurn> {
        let needle = query.to_lowercase();
        self.turns
            .iter()
            .filter(|t| t.content.to_lowercase().contains(&needle))
            .collect()
    }

    /// Aggregate statistics over the retained history
    #[must_use]
    pub fn statistics(&self) -> MemoryStatistics {
        MemoryStatistics {
            total_turns: self.turns.len(),
            user_turns: self.turns.iter().filter(|t| t.role == Role::User).count(),
            assistant_turns: self
                .turns
                .iter()
                .filter(|t| t.role == Role::Assistant)
                .count(),
            first_timestamp: self.turns.first().map(|t| t.timestamp),
            last_timestamp: self.turns.last().map(|t| t.timestamp),
        }
    }

    /// Export the retained history next to the history file
    ///
    /// # Errors
    ///
    /// Returns error if the export file cannot be written
    pub fn export(&self, format: ExportFormat) -> Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dir = self
            .history_file
            .parent()
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);

        let path = match format {
            ExportFormat::Json => dir.join(format!("conversation_{stamp}.json")),
            ExportFormat::Text => dir.join(format!("conversation_{stamp}.txt")),
        };

        let content = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&self.turns)?,
            ExportFormat::Text => self
                .turns
                .iter()
                .map(|t| {
                    format!(
                        "[{}] {}: {}",
                        t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        t.role,
                        t.content
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };

        std::fs::write(&path, content)
            .map_err(|e| Error::Memory(format!("export to {} failed: {e}", path.display())))?;

        tracing::info!(path = %path.display(), turns = self.turns.len(), "exported history");
        Ok(path)
    }

    /// Path of the backing history file
    #[must_use]
    pub fn history_file(&self) -> &Path {
        &self.history_file
    }

    fn persist(&self) {
        if let Some(parent) = self.history_file.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "could not create history directory");
                return;
            }
        }

        let result = serde_json::to_string_pretty(&self.turns)
            .map_err(Error::from)
            .and_then(|json| std::fs::write(&self.history_file, json).map_err(Error::from));

        if let Err(e) = result {
            tracing::warn!(
                path = %self.history_file.display(),
                error = %e,
                "failed to persist conversation history"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_in(dir: &Path) -> ConversationMemory {
        ConversationMemory::load(dir.join("history.json"), 10)
    }

    #[test]
    fn history_caps_at_max() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = ConversationMemory::load(dir.path().join("history.json"), 3);

        for i in 0..5 {
            mem.add_turn(Role::User, format!("message {i}"));
        }

        assert_eq!(mem.turns().len(), 3);
        assert_eq!(mem.turns()[0].content, "message 2");
        assert_eq!(mem.turns()[2].content, "message 4");
    }

    #[test]
    fn write_through_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let mut mem = ConversationMemory::load(path.clone(), 10);
            mem.add_turn(Role::User, "what time is it");
            mem.add_turn(Role::Assistant, "It's 3:05 PM");
        }

        let mem = ConversationMemory::load(path, 10);
        assert_eq!(mem.turns().len(), 2);
        assert_eq!(mem.turns()[0].role, Role::User);
        assert_eq!(mem.turns()[1].content, "It's 3:05 PM");
    }

    #[test]
    fn corrupt_history_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();

        let mem = ConversationMemory::load(path, 10);
        assert!(mem.turns().is_empty());
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        // Persistence failures must be non-fatal.
        let mut mem =
            ConversationMemory::load(PathBuf::from("/proc/no-such-dir/history.json"), 10);
        mem.add_turn(Role::User, "hello");
        assert_eq!(mem.turns().len(), 1);
    }

    #[test]
    fn messages_for_model_shapes_roles() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = memory_in(dir.path());
        mem.add_turn(Role::User, "hello");
        mem.add_turn(Role::Assistant, "hi there");

        let messages = mem.messages_for_model(5);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "hi there");
    }

    #[test]
    fn recent_limits_from_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = memory_in(dir.path());
        for i in 0..4 {
            mem.add_turn(Role::User, format!("m{i}"));
        }

        let recent = mem.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[1].content, "m3");
    }

    #[test]
    fn search_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = memory_in(dir.path());
        mem.add_turn(Role::User, "Open Spotify please");
        mem.add_turn(Role::Assistant, "Launched Spotify");
        mem.add_turn(Role::User, "what time is it");

        assert_eq!(mem.search("SPOTIFY").len(), 2);
        assert_eq!(mem.search("time").len(), 1);
        assert!(mem.search("weather").is_empty());
    }

    #[test]
    fn statistics_count_roles() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = memory_in(dir.path());
        mem.add_turn(Role::User, "a");
        mem.add_turn(Role::Assistant, "b");
        mem.add_turn(Role::User, "c");

        let stats = mem.statistics();
        assert_eq!(stats.total_turns, 3);
        assert_eq!(stats.user_turns, 2);
        assert_eq!(stats.assistant_turns, 1);
        assert!(stats.first_timestamp.is_some());
        assert!(stats.first_timestamp <= stats.last_timestamp);
    }

    #[test]
    fn clear_empties_disk_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut mem = ConversationMemory::load(path.clone(), 10);
        mem.add_turn(Role::User, "hello");
        mem.clear();

        let reloaded = ConversationMemory::load(path, 10);
        assert!(reloaded.turns().is_empty());
    }

    #[test]
    fn export_writes_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = memory_in(dir.path());
        mem.add_turn(Role::User, "hello");
        mem.add_turn(Role::Assistant, "hi");

        let json_path = mem.export(ExportFormat::Json).unwrap();
        assert!(json_path.exists());
        let parsed: Vec<ConversationTurn> =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);

        let text_path = mem.export(ExportFormat::Text).unwrap();
        let text = std::fs::read_to_string(&text_path).unwrap();
        assert!(text.contains("user: hello"));
        assert!(text.contains("assistant: hi"));
    }
}
