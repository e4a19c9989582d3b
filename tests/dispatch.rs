//! Dispatcher integration tests
//!
//! Drive the dispatcher against a fake desktop so command routing and
//! spoken outcomes can be asserted without a display server.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use vesper::automation::{Automation, WindowId};
use vesper::config::{Config, ConfigFile};
use vesper::dispatch::{Dispatcher, Effect};

/// Records every automation call; configurable windows and processes
#[derive(Default)]
struct FakeDesktop {
    calls: Mutex<Vec<String>>,
    windows: Mutex<HashMap<String, WindowId>>,
    running: Mutex<HashSet<String>>,
}

impl FakeDesktop {
    fn with_window(self, title: &str, id: &str) -> Self {
        self.windows
            .lock()
            .unwrap()
            .insert(title.to_string(), id.to_string());
        self
    }

    fn with_process(self, name: &str) -> Self {
        self.running.lock().unwrap().insert(name.to_string());
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Automation for FakeDesktop {
    fn find_window(&self, title_fragment: &str) -> Option<WindowId> {
        let fragment = title_fragment.to_lowercase();
        self.windows
            .lock()
            .unwrap()
            .iter()
            .find(|(title, _)| title.to_lowercase().contains(&fragment))
            .map(|(_, id)| id.clone())
    }

    fn focus_window(&self, id: &WindowId) -> vesper::Result<()> {
        self.record(format!("focus:{id}"));
        Ok(())
    }

    fn minimize_window(&self, id: &WindowId) -> vesper::Result<()> {
        self.record(format!("minimize:{id}"));
        Ok(())
    }

    fn maximize_window(&self, id: &WindowId) -> vesper::Result<()> {
        self.record(format!("maximize:{id}"));
        Ok(())
    }

    fn close_window(&self, id: &WindowId) -> vesper::Result<()> {
        self.record(format!("close:{id}"));
        Ok(())
    }

    fn send_keys(&self, combo: &str) -> vesper::Result<()> {
        self.record(format!("keys:{combo}"));
        Ok(())
    }

    fn type_text(&self, text: &str) -> vesper::Result<()> {
        self.record(format!("type:{text}"));
        Ok(())
    }

    fn spawn(&self, path: &str) -> vesper::Result<()> {
        self.record(format!("spawn:{path}"));
        Ok(())
    }

    fn open_url(&self, url: &str) -> vesper::Result<()> {
        self.record(format!("url:{url}"));
        Ok(())
    }

    fn is_process_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    fn terminate_process(&self, name: &str) -> vesper::Result<()> {
        self.record(format!("terminate:{name}"));
        Ok(())
    }

    fn run_shell(&self, command_line: &str) -> vesper::Result<()> {
        self.record(format!("shell:{command_line}"));
        Ok(())
    }
}

fn config_from(toml: &str) -> Config {
    let settings: ConfigFile = toml::from_str(toml).unwrap();
    Config::from_settings(settings).unwrap()
}

fn dispatcher_with(toml: &str, desktop: FakeDesktop) -> (Dispatcher, Arc<FakeDesktop>) {
    let desktop = Arc::new(desktop);
    let dispatcher = Dispatcher::new(&config_from(toml), Arc::clone(&desktop) as Arc<dyn Automation>);
    (dispatcher, desktop)
}

#[test]
fn time_query_speaks_clock_pattern() {
    let (mut dispatcher, _) = dispatcher_with("", FakeDesktop::default());

    let result = dispatcher.dispatch("what time is it");
    let outcome = result.outcome.unwrap();

    assert!(outcome.success);
    assert!(outcome.message.starts_with("It's "));
    assert!(outcome.message.contains(':'));
    assert!(outcome.message.ends_with("AM") || outcome.message.ends_with("PM"));
}

#[test]
fn media_without_player_reports_uninitialized() {
    let (mut dispatcher, desktop) = dispatcher_with("", FakeDesktop::default());

    let result = dispatcher.dispatch("open spotify");
    let outcome = result.outcome.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.message, "Spotify controller not initialized");
    assert!(desktop.calls().is_empty());
}

#[test]
fn state_commands_produce_effects_not_outcomes() {
    let (mut dispatcher, _) = dispatcher_with("", FakeDesktop::default());

    let cases = [
        ("mute", Effect::Mute),
        ("unmute", Effect::Unmute),
        ("go to sleep", Effect::Sleep),
        ("goodbye", Effect::Exit),
        ("what's the meaning of life", Effect::Conversation),
    ];

    for (command, expected) in cases {
        let result = dispatcher.dispatch(command);
        assert_eq!(result.effect, expected, "command: {command}");
        assert!(result.outcome.is_none(), "command: {command}");
    }
}

#[test]
fn open_known_url() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [urls]
        youtube = "https://www.youtube.com"
        "#,
        FakeDesktop::default(),
    );

    let outcome = dispatcher.dispatch("open youtube").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Opening youtube");
    assert_eq!(desktop.calls(), vec!["url:https://www.youtube.com"]);
}

#[test]
fn open_known_application() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [applications.editors]
        notepad = "/usr/bin/gedit"
        "#,
        FakeDesktop::default(),
    );

    let outcome = dispatcher.dispatch("open notepad").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Opened notepad");
    assert_eq!(desktop.calls(), vec!["spawn:/usr/bin/gedit"]);
}

#[test]
fn open_unknown_target_fails_spoken() {
    let (mut dispatcher, desktop) = dispatcher_with("", FakeDesktop::default());

    let outcome = dispatcher.dispatch("open blender").outcome.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.message, "I don't have blender configured");
    assert!(desktop.calls().is_empty());
}

#[test]
fn write_targets_last_opened_application() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [applications.editors]
        notepad = "/usr/bin/gedit"
        "#,
        FakeDesktop::default().with_window("notepad", "0xa1"),
    );

    assert!(dispatcher.dispatch("open notepad").outcome.unwrap().success);
    let outcome = dispatcher.dispatch("write hello world").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Done. I wrote that in notepad");
    assert_eq!(
        desktop.calls(),
        vec!["spawn:/usr/bin/gedit", "focus:0xa1", "type:hello world"]
    );
}

#[test]
fn open_and_write_bundles_into_one_command() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [applications.editors]
        notepad = "/usr/bin/gedit"
        "#,
        FakeDesktop::default().with_window("notepad", "0xa1"),
    );

    let outcome = dispatcher
        .dispatch("open notepad and write hello there")
        .outcome
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Opened notepad and wrote your text");
    assert_eq!(
        desktop.calls(),
        vec!["spawn:/usr/bin/gedit", "focus:0xa1", "type:hello there"]
    );
}

#[test]
fn write_with_nothing_open_fails() {
    let (mut dispatcher, _) = dispatcher_with("", FakeDesktop::default());

    let outcome = dispatcher.dispatch("write hello").outcome.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.message, "There's no application open to write in");
}

#[test]
fn close_open_window() {
    let (mut dispatcher, desktop) =
        dispatcher_with("", FakeDesktop::default().with_window("calculator", "0xb2"));

    let outcome = dispatcher.dispatch("close calculator").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Closed calculator");
    assert_eq!(desktop.calls(), vec!["close:0xb2"]);
}

#[test]
fn minimize_and_maximize_windows() {
    let (mut dispatcher, desktop) =
        dispatcher_with("", FakeDesktop::default().with_window("browser", "0xc3"));

    let minimized = dispatcher.dispatch("minimize browser").outcome.unwrap();
    assert!(minimized.success);
    assert_eq!(minimized.message, "Minimized browser");

    let maximized = dispatcher.dispatch("maximize browser").outcome.unwrap();
    assert!(maximized.success);
    assert_eq!(maximized.message, "Maximized browser");

    assert_eq!(desktop.calls(), vec!["minimize:0xc3", "maximize:0xc3"]);
}

#[test]
fn authorized_power_command_runs() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [power]
        shutdown = "shutdown -h now"
        "#,
        FakeDesktop::default(),
    );

    let outcome = dispatcher.dispatch("shutdown the computer").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Executing shutdown command");
    assert_eq!(desktop.calls(), vec!["shell:shutdown -h now"]);
}

#[test]
fn power_command_mentioning_two_names_picks_the_first_spoken() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [power]
        shutdown = "shutdown -h now"
        restart = "reboot"
        "#,
        FakeDesktop::default(),
    );

    let outcome = dispatcher
        .dispatch("restart or shutdown the computer")
        .outcome
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Executing restart command");
    assert_eq!(desktop.calls(), vec!["shell:reboot"]);
}

#[test]
fn unauthorized_power_command_refused() {
    let (mut dispatcher, desktop) = dispatcher_with(
        r#"
        [power]
        shutdown = "rm -rf /tmp/whatever"
        "#,
        FakeDesktop::default(),
    );

    let outcome = dispatcher.dispatch("shutdown the computer").outcome.unwrap();

    assert!(!outcome.success);
    assert!(desktop.calls().is_empty(), "nothing may be executed");
}

#[test]
fn unconfigured_power_command_fails_spoken() {
    let (mut dispatcher, desktop) = dispatcher_with("", FakeDesktop::default());

    let outcome = dispatcher.dispatch("restart the computer").outcome.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.message, "I don't have that power command configured");
    assert!(desktop.calls().is_empty());
}

#[test]
fn media_transport_sends_hotkeys() {
    let toml = r#"
        [media]
        player_path = "/usr/bin/spotify"
        "#;
    let desktop = FakeDesktop::default()
        .with_window("spotify", "0xd4")
        .with_process("spotify");
    let (mut dispatcher, desktop) = dispatcher_with(toml, desktop);

    let outcome = dispatcher.dispatch("pause").outcome.unwrap();
    assert!(outcome.success);

    let outcome = dispatcher.dispatch("next").outcome.unwrap();
    assert!(outcome.success);

    assert_eq!(
        desktop.calls(),
        vec!["focus:0xd4", "keys:space", "focus:0xd4", "keys:ctrl+Right"]
    );
}

#[test]
fn launch_when_already_running_just_focuses() {
    let toml = r#"
        [media]
        player_path = "/usr/bin/spotify"
        "#;
    let desktop = FakeDesktop::default()
        .with_window("spotify", "0xd4")
        .with_process("spotify");
    let (mut dispatcher, desktop) = dispatcher_with(toml, desktop);

    let outcome = dispatcher.dispatch("open spotify").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Spotify is already running");
    assert_eq!(desktop.calls(), vec!["focus:0xd4"]);
}

#[test]
fn close_spotify_routes_through_media() {
    let toml = r#"
        [media]
        player_path = "/usr/bin/spotify"
        "#;
    let desktop = FakeDesktop::default().with_process("spotify");
    let (mut dispatcher, desktop) = dispatcher_with(toml, desktop);

    let outcome = dispatcher.dispatch("close spotify").outcome.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.message, "Closed Spotify");
    assert_eq!(desktop.calls(), vec!["terminate:spotify"]);
}

#[test]
fn media_hotkey_overrides_apply() {
    let toml = r#"
        [media]
        player_path = "/usr/bin/spotify"

        [media.hotkeys]
        play_pause = "XF86AudioPlay"
        "#;
    let desktop = FakeDesktop::default()
        .with_window("spotify", "0xd4")
        .with_process("spotify");
    let (mut dispatcher, desktop) = dispatcher_with(toml, desktop);

    dispatcher.dispatch("pause");

    assert_eq!(desktop.calls(), vec!["focus:0xd4", "keys:XF86AudioPlay"]);
}
