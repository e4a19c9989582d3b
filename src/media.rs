//! Media player control
//!
//! Drives a desktop music player (Spotify by default) through window focus
//! and keyboard shortcuts. All OS access goes through [`Automation`], so the
//! controller itself is plain policy: launch, focus with retries, send keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::automation::{Automation, WindowId};
use crate::config::MediaSection;
use crate::dispatch::Outcome;

/// Built-in playlist names for the "play something" path
const RANDOM_PLAYLISTS: &[&str] = &[
    "discover weekly",
    "release radar",
    "daily mix",
    "chill hits",
    "today's top hits",
];

/// Keyboard shortcuts for player actions
#[derive(Debug, Clone)]
pub struct MediaKeys {
    pub play_pause: String,
    pub next_track: String,
    pub previous_track: String,
    pub volume_up: String,
    pub volume_down: String,
    pub shuffle: String,
    pub repeat: String,
    pub like: String,
    pub search: String,
}

impl Default for MediaKeys {
    fn default() -> Self {
        Self {
            play_pause: "space".to_string(),
            next_track: "ctrl+Right".to_string(),
            previous_track: "ctrl+Left".to_string(),
            volume_up: "ctrl+Up".to_string(),
            volume_down: "ctrl+Down".to_string(),
            shuffle: "ctrl+s".to_string(),
            repeat: "ctrl+r".to_string(),
            like: "alt+shift+b".to_string(),
            search: "ctrl+l".to_string(),
        }
    }
}

impl MediaKeys {
    /// Built-in defaults with per-action config overrides applied
    #[must_use]
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut keys = Self::default();
        for (action, combo) in overrides {
            match action.as_str() {
                "play_pause" => keys.play_pause = combo.clone(),
                "next_track" => keys.next_track = combo.clone(),
                "previous_track" => keys.previous_track = combo.clone(),
                "volume_up" => keys.volume_up = combo.clone(),
                "volume_down" => keys.volume_down = combo.clone(),
                "shuffle" => keys.shuffle = combo.clone(),
                "repeat" => keys.repeat = combo.clone(),
                "like" => keys.like = combo.clone(),
                "search" => keys.search = combo.clone(),
                other => tracing::warn!(action = %other, "unknown media hotkey, ignoring"),
            }
        }
        keys
    }
}

/// Simple transport actions mapped straight to a shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    PlayPause,
    Next,
    Previous,
    Shuffle,
    Repeat,
    Like,
}

impl PlaybackAction {
    const fn spoken(self) -> &'static str {
        match self {
            Self::PlayPause => "Toggled playback",
            Self::Next => "Skipping to the next track",
            Self::Previous => "Going back a track",
            Self::Shuffle => "Toggled shuffle",
            Self::Repeat => "Toggled repeat",
            Self::Like => "Added to your liked songs",
        }
    }
}

/// Focus-and-shortcut controller for the configured player
pub struct MediaController {
    automation: Arc<dyn Automation>,
    player_path: String,
    process_name: String,
    window_title: String,
    launch_wait: Duration,
    focus_retries: u32,
    keys: MediaKeys,
}

impl MediaController {
    /// Build a controller when a player path is configured
    #[must_use]
    pub fn from_config(media: &MediaSection, automation: Arc<dyn Automation>) -> Option<Self> {
        let player_path = media.player_path.clone()?;

        Some(Self {
            automation,
            player_path,
            process_name: media.process_name.clone(),
            window_title: media.window_title.clone(),
            launch_wait: Duration::from_secs(media.launch_wait_secs),
            focus_retries: media.focus_retries.max(1),
            keys: MediaKeys::with_overrides(&media.hotkeys),
        })
    }

    /// Launch the player, waiting until its window is up
    pub fn launch(&self) -> Outcome {
        if self.automation.is_process_running(&self.process_name) {
            if let Ok(id) = self.find_player_window() {
                let _ = self.automation.focus_window(&id);
            }
            return Outcome::ok("Spotify is already running");
        }

        if let Err(e) = self.automation.spawn(&self.player_path) {
            tracing::warn!(error = %e, "player launch failed");
            return Outcome::fail("Could not launch Spotify");
        }

        // Poll for the window rather than trusting a fixed delay.
        let deadline = std::time::Instant::now() + self.launch_wait;
        while std::time::Instant::now() < deadline {
            if self.automation.find_window(&self.window_title).is_some() {
                return Outcome::ok("Launched Spotify successfully");
            }
            std::thread::sleep(Duration::from_millis(500));
        }

        Outcome::fail("Spotify did not come up in time")
    }

    /// Send a transport shortcut
    pub fn control(&self, action: PlaybackAction) -> Outcome {
        let combo = match action {
            PlaybackAction::PlayPause => &self.keys.play_pause,
            PlaybackAction::Next => &self.keys.next_track,
            PlaybackAction::Previous => &self.keys.previous_track,
            PlaybackAction::Shuffle => &self.keys.shuffle,
            PlaybackAction::Repeat => &self.keys.repeat,
            PlaybackAction::Like => &self.keys.like,
        };

        match self.with_focus(|a| a.send_keys(combo)) {
            Ok(()) => Outcome::ok(action.spoken()),
            Err(e) => {
                tracing::warn!(error = %e, ?action, "media control failed");
                Outcome::fail("I couldn't reach the player")
            }
        }
    }

    /// Search for a track and start playback
    pub fn search_and_play(&self, query: &str) -> Outcome {
        if !self.automation.is_process_running(&self.process_name) {
            let launched = self.launch();
            if !launched.success {
                return launched;
            }
        }

        let result = self.with_focus(|a| {
            a.send_keys(&self.keys.search)?;
            a.send_keys("ctrl+a")?;
            a.send_keys("BackSpace")?;
            a.type_text(query)?;
            std::thread::sleep(Duration::from_millis(800));
            a.send_keys("Return")?;
            std::thread::sleep(Duration::from_millis(1200));
            a.send_keys("Tab")?;
            a.send_keys("Return")
        });

        match result {
            Ok(()) => Outcome::ok(format!("Playing {query}")),
            Err(e) => {
                tracing::warn!(error = %e, query = %query, "search and play failed");
                Outcome::fail(format!("I couldn't play {query}"))
            }
        }
    }

    /// Pick something from the built-in playlist list
    pub fn play_random(&self) -> Outcome {
        use rand::seq::SliceRandom;

        let mut rng = rand::thread_rng();
        let playlist = RANDOM_PLAYLISTS
            .choose(&mut rng)
            .copied()
            .unwrap_or("discover weekly");

        self.search_and_play(playlist)
    }

    /// Nudge the player volume by repeated shortcut presses
    pub fn adjust_volume(&self, up: bool, steps: u32) -> Outcome {
        let combo = if up {
            &self.keys.volume_up
        } else {
            &self.keys.volume_down
        };

        let result = self.with_focus(|a| {
            for _ in 0..steps.max(1) {
                a.send_keys(combo)?;
                std::thread::sleep(Duration::from_millis(100));
            }
            Ok(())
        });

        match result {
            Ok(()) => Outcome::ok(if up {
                "Volume up"
            } else {
                "Volume down"
            }),
            Err(e) => {
                tracing::warn!(error = %e, "volume adjust failed");
                Outcome::fail("I couldn't change the volume")
            }
        }
    }

    /// Minimize the player window
    pub fn minimize_player(&self) -> Outcome {
        match self.find_player_window() {
            Ok(id) => match self.automation.minimize_window(&id) {
                Ok(()) => Outcome::ok("Minimized Spotify"),
                Err(_) => Outcome::fail("I couldn't minimize Spotify"),
            },
            Err(_) => Outcome::fail("Spotify doesn't seem to be open"),
        }
    }

    /// Restore and focus the player window
    pub fn restore_player(&self) -> Outcome {
        match self.find_player_window() {
            Ok(id) => match self.automation.focus_window(&id) {
                Ok(()) => Outcome::ok("Spotify restored"),
                Err(_) => Outcome::fail("I couldn't restore Spotify"),
            },
            Err(_) => Outcome::fail("Spotify doesn't seem to be open"),
        }
    }

    /// Quit the player
    pub fn close_player(&self) -> Outcome {
        if !self.automation.is_process_running(&self.process_name) {
            return Outcome::ok("Spotify isn't running");
        }

        match self.automation.terminate_process(&self.process_name) {
            Ok(()) => Outcome::ok("Closed Spotify"),
            Err(e) => {
                tracing::warn!(error = %e, "player close failed");
                Outcome::fail("I couldn't close Spotify")
            }
        }
    }

    /// Find the player window, retrying while it settles
    fn find_player_window(&self) -> crate::Result<WindowId> {
        for attempt in 0..self.focus_retries {
            if let Some(id) = self.automation.find_window(&self.window_title) {
                return Ok(id);
            }
            if attempt + 1 < self.focus_retries {
                std::thread::sleep(Duration::from_millis(500));
            }
        }
        Err(crate::Error::Automation(format!(
            "no window matching '{}'",
            self.window_title
        )))
    }

    /// Focus the player, then run key injection against it
    fn with_focus<F>(&self, f: F) -> crate::Result<()>
    where
        F: FnOnce(&dyn Automation) -> crate::Result<()>,
    {
        let id = self.find_player_window()?;
        self.automation.focus_window(&id)?;
        f(self.automation.as_ref())
    }
}
