//! Desktop automation primitives
//!
//! Every OS interaction the dispatcher performs goes through the
//! [`Automation`] trait so command handling stays testable without a display
//! server. The shipped [`DesktopAutomation`] drives standard X11 tooling
//! (`xdotool`, `wmctrl`) through subprocesses.

use std::process::{Command, Stdio};
use std::time::Duration;

use crate::{Error, Result};

/// Opaque window identifier, as reported by the window manager
pub type WindowId = String;

/// Desktop capabilities the dispatcher relies on
pub trait Automation: Send + Sync {
    /// Find a window whose title contains the given fragment (case-insensitive)
    fn find_window(&self, title_fragment: &str) -> Option<WindowId>;

    /// Find a window that may still be appearing
    ///
    /// Any polling or settle delay belongs to the adapter; callers get a
    /// plain lookup result. The default is a single immediate lookup.
    fn wait_for_window(&self, title_fragment: &str) -> Option<WindowId> {
        self.find_window(title_fragment)
    }

    /// Bring a window to the foreground
    ///
    /// # Errors
    ///
    /// Returns error if the window manager rejects the request
    fn focus_window(&self, id: &WindowId) -> Result<()>;

    /// Minimize a window
    ///
    /// # Errors
    ///
    /// Returns error if the window manager rejects the request
    fn minimize_window(&self, id: &WindowId) -> Result<()>;

    /// Maximize a window
    ///
    /// # Errors
    ///
    /// Returns error if the window manager rejects the request
    fn maximize_window(&self, id: &WindowId) -> Result<()>;

    /// Close a window
    ///
    /// # Errors
    ///
    /// Returns error if the window manager rejects the request
    fn close_window(&self, id: &WindowId) -> Result<()>;

    /// Send a key combination (e.g. "ctrl+Right") to the focused window
    ///
    /// # Errors
    ///
    /// Returns error if key injection fails
    fn send_keys(&self, combo: &str) -> Result<()>;

    /// Type literal text into the focused window
    ///
    /// # Errors
    ///
    /// Returns error if key injection fails
    fn type_text(&self, text: &str) -> Result<()>;

    /// Launch an executable, detached
    ///
    /// # Errors
    ///
    /// Returns error if the process cannot be spawned
    fn spawn(&self, path: &str) -> Result<()>;

    /// Open a URL in the default browser
    ///
    /// # Errors
    ///
    /// Returns error if the opener cannot be spawned
    fn open_url(&self, url: &str) -> Result<()>;

    /// Whether a process with the given name is running
    fn is_process_running(&self, name: &str) -> bool;

    /// Terminate all processes matching the given name
    ///
    /// # Errors
    ///
    /// Returns error if termination fails
    fn terminate_process(&self, name: &str) -> Result<()>;

    /// Run a shell command line, detached
    ///
    /// # Errors
    ///
    /// Returns error if the shell cannot be spawned
    fn run_shell(&self, command_line: &str) -> Result<()>;
}

/// X11 desktop adapter backed by `xdotool` and `wmctrl`
pub struct DesktopAutomation {
    /// Settle delay after focus changes, before key injection
    settle: Duration,
    /// How long to poll for a window that is still appearing
    window_wait: Duration,
}

impl Default for DesktopAutomation {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopAutomation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            settle: Duration::from_millis(300),
            window_wait: Duration::from_secs(5),
        }
    }

    fn xdotool(args: &[&str]) -> Result<String> {
        let output = Command::new("xdotool")
            .args(args)
            .output()
            .map_err(|e| Error::Automation(format!("xdotool: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Automation(format!(
                "xdotool {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn wmctrl(args: &[&str]) -> Result<()> {
        let status = Command::new("wmctrl")
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::Automation(format!("wmctrl: {e}")))?;

        if !status.success() {
            return Err(Error::Automation(format!("wmctrl {args:?} failed")));
        }
        Ok(())
    }
}

impl Automation for DesktopAutomation {
    fn find_window(&self, title_fragment: &str) -> Option<WindowId> {
        let output = Self::xdotool(&["search", "--name", title_fragment]).ok()?;
        output.lines().next().map(|id| id.trim().to_string())
    }

    fn wait_for_window(&self, title_fragment: &str) -> Option<WindowId> {
        let deadline = std::time::Instant::now() + self.window_wait;
        loop {
            if let Some(id) = self.find_window(title_fragment) {
                return Some(id);
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(250));
        }
    }

    fn focus_window(&self, id: &WindowId) -> Result<()> {
        Self::xdotool(&["windowactivate", "--sync", id])?;
        std::thread::sleep(self.settle);
        Ok(())
    }

    fn minimize_window(&self, id: &WindowId) -> Result<()> {
        Self::xdotool(&["windowminimize", id]).map(|_| ())
    }

    fn maximize_window(&self, id: &WindowId) -> Result<()> {
        Self::wmctrl(&["-i", "-r", id, "-b", "add,maximized_vert,maximized_horz"])
    }

    fn close_window(&self, id: &WindowId) -> Result<()> {
        Self::wmctrl(&["-i", "-c", id])
    }

    fn send_keys(&self, combo: &str) -> Result<()> {
        Self::xdotool(&["key", combo]).map(|_| ())
    }

    fn type_text(&self, text: &str) -> Result<()> {
        Self::xdotool(&["type", "--delay", "30", text]).map(|_| ())
    }

    fn spawn(&self, path: &str) -> Result<()> {
        Command::new(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Automation(format!("launch {path}: {e}")))?;
        tracing::debug!(path = %path, "spawned process");
        Ok(())
    }

    fn open_url(&self, url: &str) -> Result<()> {
        let opener = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };

        Command::new(opener)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Automation(format!("open url {url}: {e}")))?;
        tracing::debug!(url = %url, "opened url");
        Ok(())
    }

    fn is_process_running(&self, name: &str) -> bool {
        Command::new("pgrep")
            .args(["-f", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn terminate_process(&self, name: &str) -> Result<()> {
        let status = Command::new("pkill")
            .args(["-f", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::Automation(format!("pkill {name}: {e}")))?;

        if !status.success() {
            return Err(Error::Automation(format!("no process matched {name}")));
        }
        Ok(())
    }

    fn run_shell(&self, command_line: &str) -> Result<()> {
        Command::new("sh")
            .args(["-c", command_line])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Automation(format!("shell: {e}")))?;
        tracing::info!(command = %command_line, "shell command dispatched");
        Ok(())
    }
}
