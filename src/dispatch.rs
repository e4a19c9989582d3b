//! Command dispatch
//!
//! Recognized commands are classified into ordered action families; the
//! first family that claims a command handles it. Ordering is part of the
//! contract: a bare "stop" is a playback command because media is checked
//! before the close family, and "stop listening" still reaches the sleep
//! family because media only claims "stop" as an exact command.

use std::collections::HashMap;
use std::sync::Arc;

use crate::automation::Automation;
use crate::config::Config;
use crate::media::{MediaController, PlaybackAction};

/// Spoken result of a handled command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// State transition the command loop must apply after a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing beyond speaking the outcome
    None,
    /// Suppress speech output
    Mute,
    /// Restore speech output
    Unmute,
    /// End the session at the user's request
    Sleep,
    /// Shut the assistant down
    Exit,
    /// No family claimed the command; fall back to the language model
    Conversation,
}

/// Result of dispatching one command
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub outcome: Option<Outcome>,
    pub effect: Effect,
}

impl DispatchResult {
    fn spoken(outcome: Outcome) -> Self {
        Self {
            outcome: Some(outcome),
            effect: Effect::None,
        }
    }

    const fn effect(effect: Effect) -> Self {
        Self {
            outcome: None,
            effect,
        }
    }
}

/// Ordered action families; earlier families shadow later ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFamily {
    Mute,
    Unmute,
    TimeQuery,
    MediaControl,
    Sleep,
    OpenTarget,
    Write,
    Close,
    WindowControl,
    Power,
    Exit,
    Fallback,
}

const MUTE_PHRASES: &[&str] = &[
    "mute",
    "be quiet",
    "silence",
    "stop talking",
    "shut up",
    "quiet mode",
];

const UNMUTE_PHRASES: &[&str] = &["unmute", "speak again", "voice on", "you can talk"];

/// Claimed only as exact commands so phrases like "stop listening" fall
/// through to the sleep family.
const MEDIA_EXACT: &[&str] = &["stop", "pause", "resume", "next", "previous", "skip"];

const MEDIA_WORDS: &[&str] = &[
    "play", "music", "song", "track", "spotify", "playlist", "volume", "louder", "quieter",
    "shuffle",
];

const SLEEP_PHRASES: &[&str] = &[
    "go to sleep",
    "sleep now",
    "sleep mode",
    "stop listening",
    "you can sleep",
    "go offline",
];

const OPEN_VERBS: &[&str] = &["open", "start", "launch", "run"];

const WRITE_VERBS: &[&str] = &["write", "type"];

const CLOSE_VERBS: &[&str] = &["close", "kill", "terminate"];

const WINDOW_PHRASES: &[&str] = &[
    "minimize", "minimise", "maximize", "maximise", "full screen", "hide window", "restore window",
];

const POWER_PHRASES: &[&str] = &["shutdown", "shut down", "restart", "reboot", "hibernate", "power off"];

const EXIT_PHRASES: &[&str] = &["goodbye", "good bye", "bye bye", "see you later", "good night"];

/// Command prefixes the power family will actually execute
const AUTHORIZED_POWER_PREFIXES: &[&str] =
    &["shutdown", "poweroff", "reboot", "systemctl", "loginctl", "rundll32"];

/// Classify a normalized command into its action family
///
/// First match wins, in declaration order.
#[must_use]
pub fn classify(command: &str) -> ActionFamily {
    let cmd = normalize(command);

    if contains_any(&cmd, MUTE_PHRASES) {
        return ActionFamily::Mute;
    }
    if contains_any(&cmd, UNMUTE_PHRASES) {
        return ActionFamily::Unmute;
    }
    if is_time_query(&cmd) {
        return ActionFamily::TimeQuery;
    }
    if MEDIA_EXACT.contains(&cmd.as_str()) || contains_any(&cmd, MEDIA_WORDS) {
        return ActionFamily::MediaControl;
    }
    if contains_any(&cmd, SLEEP_PHRASES) {
        return ActionFamily::Sleep;
    }
    if first_word_in(&cmd, OPEN_VERBS) {
        return ActionFamily::OpenTarget;
    }
    if first_word_in(&cmd, WRITE_VERBS) {
        return ActionFamily::Write;
    }
    if first_word_in(&cmd, CLOSE_VERBS) {
        return ActionFamily::Close;
    }
    if contains_any(&cmd, WINDOW_PHRASES) {
        return ActionFamily::WindowControl;
    }
    if contains_any(&cmd, POWER_PHRASES) {
        return ActionFamily::Power;
    }
    if contains_any(&cmd, EXIT_PHRASES) {
        return ActionFamily::Exit;
    }

    ActionFamily::Fallback
}

fn normalize(command: &str) -> String {
    command
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_any(cmd: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| cmd.contains(p))
}

fn first_word_in(cmd: &str, verbs: &[&str]) -> bool {
    cmd.split_whitespace()
        .next()
        .is_some_and(|w| verbs.contains(&w))
}

fn is_time_query(cmd: &str) -> bool {
    (cmd.contains("what") && cmd.contains("time"))
        || cmd == "time"
        || cmd.contains("tell me the time")
}

/// Routes classified commands to their handlers
pub struct Dispatcher {
    automation: Arc<dyn Automation>,
    media: Option<MediaController>,
    apps: HashMap<String, String>,
    urls: HashMap<String, String>,
    power: HashMap<String, String>,
    /// Last application opened by voice, the implicit target for "write ..."
    current_app: Option<String>,
}

impl Dispatcher {
    /// Build a dispatcher from config tables
    ///
    /// Application categories are flattened into a single name-to-path map;
    /// the media controller exists only when a player path is configured.
    #[must_use]
    pub fn new(config: &Config, automation: Arc<dyn Automation>) -> Self {
        let apps = config
            .settings
            .applications
            .values()
            .flat_map(|category| category.iter())
            .map(|(name, path)| (name.to_lowercase(), path.clone()))
            .collect();

        let urls = config
            .settings
            .urls
            .iter()
            .map(|(name, url)| (name.to_lowercase(), url.clone()))
            .collect();

        let media = MediaController::from_config(&config.settings.media, Arc::clone(&automation));

        Self {
            automation,
            media,
            apps,
            urls,
            power: config.settings.power.clone(),
            current_app: None,
        }
    }

    /// Dispatch one recognized command
    pub fn dispatch(&mut self, command: &str) -> DispatchResult {
        let cmd = normalize(command);
        let family = classify(&cmd);
        tracing::info!(command = %cmd, family = ?family, "dispatching command");

        match family {
            ActionFamily::Mute => DispatchResult::effect(Effect::Mute),
            ActionFamily::Unmute => DispatchResult::effect(Effect::Unmute),
            ActionFamily::Sleep => DispatchResult::effect(Effect::Sleep),
            ActionFamily::Exit => DispatchResult::effect(Effect::Exit),
            ActionFamily::Fallback => DispatchResult::effect(Effect::Conversation),
            ActionFamily::TimeQuery => DispatchResult::spoken(Self::handle_time()),
            ActionFamily::MediaControl => DispatchResult::spoken(self.handle_media(&cmd)),
            ActionFamily::OpenTarget => DispatchResult::spoken(self.handle_open(&cmd)),
            ActionFamily::Write => DispatchResult::spoken(self.handle_write(&cmd)),
            ActionFamily::Close => DispatchResult::spoken(self.handle_close(&cmd)),
            ActionFamily::WindowControl => DispatchResult::spoken(self.handle_window(&cmd)),
            ActionFamily::Power => DispatchResult::spoken(self.handle_power(&cmd)),
        }
    }

    fn handle_time() -> Outcome {
        let now = chrono::Local::now();
        Outcome::ok(format!("It's {}", now.format("%-I:%M %p")))
    }

    fn handle_media(&self, cmd: &str) -> Outcome {
        let Some(media) = &self.media else {
            return Outcome::fail("Spotify controller not initialized");
        };

        if OPEN_VERBS.iter().any(|v| cmd.starts_with(v)) && cmd.contains("spotify") {
            return media.launch();
        }
        if cmd.contains("close") || cmd.contains("quit") {
            return media.close_player();
        }
        if cmd.contains("minimize") || cmd.contains("minimise") || cmd.contains("hide") {
            return media.minimize_player();
        }
        if cmd.contains("restore") || cmd.contains("bring back") {
            return media.restore_player();
        }
        if cmd.contains("volume up") || cmd.contains("louder") || cmd.contains("turn it up") {
            return media.adjust_volume(true, 2);
        }
        if cmd.contains("volume down") || cmd.contains("quieter") || cmd.contains("turn it down") {
            return media.adjust_volume(false, 2);
        }
        if matches!(cmd, "play" | "play something" | "play music" | "play anything") {
            return media.play_random();
        }
        if let Some(query) = cmd.strip_prefix("play ") {
            return media.search_and_play(query.trim());
        }
        if cmd == "stop" || cmd.contains("pause") {
            return media.control(PlaybackAction::PlayPause);
        }
        if cmd.contains("resume") || cmd.contains("continue") {
            return media.control(PlaybackAction::PlayPause);
        }
        if cmd.contains("next") || cmd.contains("skip") {
            return media.control(PlaybackAction::Next);
        }
        if cmd.contains("previous") || cmd.contains("go back") {
            return media.control(PlaybackAction::Previous);
        }
        if cmd.contains("shuffle") {
            return media.control(PlaybackAction::Shuffle);
        }
        if cmd.contains("repeat") {
            return media.control(PlaybackAction::Repeat);
        }
        if cmd.contains("like") || cmd.contains("save this") {
            return media.control(PlaybackAction::Like);
        }

        // Anything else that mentioned music is treated as a play request.
        media.search_and_play(cmd)
    }

    fn handle_open(&mut self, cmd: &str) -> Outcome {
        let rest = strip_first_word(cmd);
        let rest = rest.strip_prefix("the ").unwrap_or(rest).trim();

        if rest.is_empty() {
            return Outcome::fail("Open what?");
        }

        // "open notepad and write hello" bundles a write into the open.
        let (target, text) = match rest.split_once(" and write ") {
            Some((t, w)) => (t.trim(), Some(w.trim())),
            None => (rest, None),
        };

        if let Some(url) = self.urls.get(target) {
            return match self.automation.open_url(url) {
                Ok(()) => Outcome::ok(format!("Opening {target}")),
                Err(e) => {
                    tracing::warn!(error = %e, target = %target, "url open failed");
                    Outcome::fail(format!("I couldn't open {target}"))
                }
            };
        }

        let Some(path) = self.apps.get(target) else {
            return Outcome::fail(format!("I don't have {target} configured"));
        };

        if let Err(e) = self.automation.spawn(path) {
            tracing::warn!(error = %e, target = %target, "application launch failed");
            return Outcome::fail(format!("I couldn't open {target}"));
        }

        self.current_app = Some(target.to_string());

        if let Some(text) = text {
            // The freshly launched window may still be appearing; the
            // adapter owns that wait.
            if let Some(id) = self.automation.wait_for_window(target) {
                let _ = self.automation.focus_window(&id);
            }
            return match self.automation.type_text(text) {
                Ok(()) => Outcome::ok(format!("Opened {target} and wrote your text")),
                Err(_) => Outcome::fail(format!("Opened {target}, but I couldn't write there")),
            };
        }

        Outcome::ok(format!("Opened {target}"))
    }

    fn handle_write(&self, cmd: &str) -> Outcome {
        let text = strip_first_word(cmd).trim();
        if text.is_empty() {
            return Outcome::fail("Write what?");
        }

        let Some(app) = &self.current_app else {
            return Outcome::fail("There's no application open to write in");
        };

        if let Some(id) = self.automation.find_window(app) {
            let _ = self.automation.focus_window(&id);
        }

        match self.automation.type_text(text) {
            Ok(()) => Outcome::ok(format!("Done. I wrote that in {app}")),
            Err(e) => {
                tracing::warn!(error = %e, app = %app, "text injection failed");
                Outcome::fail(format!("I couldn't write in {app}"))
            }
        }
    }

    fn handle_close(&mut self, cmd: &str) -> Outcome {
        let target = strip_first_word(cmd).trim();
        if target.is_empty() {
            return Outcome::fail("Close what?");
        }

        if target.contains("spotify") || target.contains("music") || target.contains("player") {
            if let Some(media) = &self.media {
                return media.close_player();
            }
        }

        let outcome = if let Some(id) = self.automation.find_window(target) {
            match self.automation.close_window(&id) {
                Ok(()) => Outcome::ok(format!("Closed {target}")),
                Err(_) => Outcome::fail(format!("I couldn't close {target}")),
            }
        } else if self.apps.contains_key(target) {
            match self.automation.terminate_process(target) {
                Ok(()) => Outcome::ok(format!("Closed {target}")),
                Err(_) => Outcome::fail(format!("{target} doesn't seem to be running")),
            }
        } else {
            Outcome::fail(format!("I couldn't find {target} to close"))
        };

        if outcome.success && self.current_app.as_deref() == Some(target) {
            self.current_app = None;
        }

        outcome
    }

    fn handle_window(&self, cmd: &str) -> Outcome {
        let minimize = cmd.contains("minimize") || cmd.contains("minimise") || cmd.contains("hide");

        let target = cmd
            .split_whitespace()
            .skip(1)
            .filter(|w| !matches!(*w, "the" | "window" | "screen" | "full"))
            .collect::<Vec<_>>()
            .join(" ");
        let target = if target.is_empty() {
            self.current_app.clone()
        } else {
            Some(target)
        };

        let Some(target) = target else {
            return Outcome::fail("I don't know which window you mean");
        };

        let Some(id) = self.automation.find_window(&target) else {
            return Outcome::fail(format!("I couldn't find a {target} window"));
        };

        let result = if minimize {
            self.automation.minimize_window(&id)
        } else {
            self.automation.maximize_window(&id)
        };

        match result {
            Ok(()) if minimize => Outcome::ok(format!("Minimized {target}")),
            Ok(()) => Outcome::ok(format!("Maximized {target}")),
            Err(e) => {
                tracing::warn!(error = %e, target = %target, "window control failed");
                Outcome::fail(format!("I couldn't adjust the {target} window"))
            }
        }
    }

    fn handle_power(&self, cmd: &str) -> Outcome {
        let cmd = cmd.replace("shut down", "shutdown");

        // A command mentioning several configured names picks the one
        // spoken first; name order breaks exact ties.
        let Some((name, command_line)) = self
            .power
            .iter()
            .filter_map(|(name, line)| {
                cmd.find(&name.to_lowercase()).map(|pos| (pos, name, line))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, name, line)| (name, line))
        else {
            return Outcome::fail("I don't have that power command configured");
        };

        let authorized = AUTHORIZED_POWER_PREFIXES
            .iter()
            .any(|p| command_line.trim_start().starts_with(p));
        if !authorized {
            tracing::warn!(name = %name, command = %command_line, "unauthorized power command");
            return Outcome::fail(format!("The {name} command isn't authorized"));
        }

        match self.automation.run_shell(command_line) {
            Ok(()) => Outcome::ok(format!("Executing {name} command")),
            Err(e) => {
                tracing::warn!(error = %e, name = %name, "power command failed");
                Outcome::fail(format!("The {name} command failed"))
            }
        }
    }
}

fn strip_first_word(cmd: &str) -> &str {
    cmd.split_once(' ').map_or("", |(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_order() {
        let cases = [
            ("mute", ActionFamily::Mute),
            ("stop talking", ActionFamily::Mute),
            ("unmute", ActionFamily::Unmute),
            ("you can talk now", ActionFamily::Unmute),
            ("what time is it", ActionFamily::TimeQuery),
            ("what's the time", ActionFamily::TimeQuery),
            ("play some jazz", ActionFamily::MediaControl),
            ("open spotify", ActionFamily::MediaControl),
            ("next", ActionFamily::MediaControl),
            ("volume up", ActionFamily::MediaControl),
            ("go to sleep", ActionFamily::Sleep),
            ("stop listening", ActionFamily::Sleep),
            ("open notepad", ActionFamily::OpenTarget),
            ("launch calculator", ActionFamily::OpenTarget),
            ("write hello world", ActionFamily::Write),
            ("close notepad", ActionFamily::Close),
            ("minimize the window", ActionFamily::WindowControl),
            ("maximize browser", ActionFamily::WindowControl),
            ("shutdown the computer", ActionFamily::Power),
            ("restart the system", ActionFamily::Power),
            ("goodbye", ActionFamily::Exit),
            ("good night", ActionFamily::Exit),
            ("what's the capital of france", ActionFamily::Fallback),
        ];

        for (command, expected) in cases {
            assert_eq!(classify(command), expected, "command: {command}");
        }
    }

    #[test]
    fn bare_stop_is_media_not_close() {
        // Ordering is part of the contract: media is checked before close.
        assert_eq!(classify("stop"), ActionFamily::MediaControl);
    }

    #[test]
    fn stop_listening_is_sleep_not_media() {
        // "stop" only claims media as an exact command.
        assert_eq!(classify("stop listening"), ActionFamily::Sleep);
    }

    #[test]
    fn open_spotify_is_media_not_open_target() {
        assert_eq!(classify("open spotify"), ActionFamily::MediaControl);
        assert_eq!(classify("open notepad"), ActionFamily::OpenTarget);
    }

    #[test]
    fn shut_up_is_mute_not_power() {
        assert_eq!(classify("shut up"), ActionFamily::Mute);
        assert_eq!(classify("shut down the computer"), ActionFamily::Power);
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(classify("  WHAT   time IS it  "), ActionFamily::TimeQuery);
    }

    #[test]
    fn time_response_shape() {
        let outcome = Dispatcher::handle_time();
        assert!(outcome.success);
        assert!(outcome.message.starts_with("It's "));
        assert!(outcome.message.contains(':'));
        assert!(outcome.message.ends_with("AM") || outcome.message.ends_with("PM"));
    }

    #[test]
    fn strip_first_word_drops_verb() {
        assert_eq!(strip_first_word("open notepad"), "notepad");
        assert_eq!(strip_first_word("write hello world"), "hello world");
        assert_eq!(strip_first_word("stop"), "");
    }
}
