//! Active-session lifecycle
//!
//! The assistant is dormant until a wake word arrives, serves a bounded
//! number of commands while active, then returns to dormant. A background
//! watchdog expires sessions that outlive their time budget.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle phase of the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a wake word
    Dormant,
    /// Serving commands
    Active,
    /// Terminal; no further transitions
    Shutdown,
}

/// Why an active session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// Command budget spent
    BudgetExhausted,
    /// Session outlived its time budget
    SessionTimeout,
    /// No activity for longer than the idle timeout
    IdleTimeout,
    /// Too many consecutive recognition failures
    RecognitionFailures,
    /// The user asked the assistant to sleep
    UserRequested,
}

impl std::fmt::Display for DeactivationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::SessionTimeout => write!(f, "session_timeout"),
            Self::IdleTimeout => write!(f, "idle_timeout"),
            Self::RecognitionFailures => write!(f, "recognition_failures"),
            Self::UserRequested => write!(f, "user_requested"),
        }
    }
}

struct SessionInner {
    active: AtomicBool,
    shutting_down: AtomicBool,
    manual_sleep: AtomicBool,
    command_count: AtomicU32,
    activated_at: Mutex<Option<Instant>>,
    last_activity: Mutex<Option<Instant>>,
}

/// Thread-safe session state, shared between the command loop and the watchdog
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    command_budget: u32,
    timeout: Duration,
    idle_timeout: Duration,
}

impl Session {
    /// Create a dormant session with the given limits
    #[must_use]
    pub fn new(command_budget: u32, timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                active: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                manual_sleep: AtomicBool::new(false),
                command_count: AtomicU32::new(0),
                activated_at: Mutex::new(None),
                last_activity: Mutex::new(None),
            }),
            command_budget,
            timeout,
            idle_timeout,
        }
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            SessionPhase::Shutdown
        } else if self.inner.active.load(Ordering::SeqCst) {
            SessionPhase::Active
        } else {
            SessionPhase::Dormant
        }
    }

    /// Whether a session is currently active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Begin a new session: resets the command count and the session clock
    pub fn activate(&self) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        self.inner.command_count.store(0, Ordering::SeqCst);
        self.inner.manual_sleep.store(false, Ordering::SeqCst);
        let now = Instant::now();
        if let Ok(mut at) = self.inner.activated_at.lock() {
            *at = Some(now);
        }
        if let Ok(mut at) = self.inner.last_activity.lock() {
            *at = Some(now);
        }
        self.inner.active.store(true, Ordering::SeqCst);

        tracing::info!("session activated");
    }

    /// End the active session
    ///
    /// Idempotent: returns `true` only for the call that actually
    /// deactivated, so double-triggering (e.g. watchdog racing the command
    /// loop) logs and reacts once.
    pub fn deactivate(&self, reason: DeactivationReason) -> bool {
        let was_active = self.inner.active.swap(false, Ordering::SeqCst);

        if was_active {
            if reason == DeactivationReason::UserRequested {
                self.inner.manual_sleep.store(true, Ordering::SeqCst);
            }
            tracing::info!(
                reason = %reason,
                commands_served = self.inner.command_count.load(Ordering::SeqCst),
                "session deactivated"
            );
        }

        was_active
    }

    /// Record one served command; returns the new count
    ///
    /// Also marks activity, resetting the idle clock (but never the
    /// session clock).
    pub fn record_command(&self) -> u32 {
        self.touch();
        self.inner.command_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark activity without counting a command (e.g. speech heard but
    /// not yet dispatched)
    pub fn touch(&self) {
        if let Ok(mut at) = self.inner.last_activity.lock() {
            *at = Some(Instant::now());
        }
    }

    /// Commands served this session
    #[must_use]
    pub fn command_count(&self) -> u32 {
        self.inner.command_count.load(Ordering::SeqCst)
    }

    /// Whether the per-session command budget is spent
    #[must_use]
    pub fn budget_exhausted(&self) -> bool {
        self.inner.command_count.load(Ordering::SeqCst) >= self.command_budget
    }

    /// Time since activation, if active
    #[must_use]
    pub fn session_age(&self) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        self.inner
            .activated_at
            .lock()
            .ok()
            .and_then(|at| at.map(|t| t.elapsed()))
    }

    /// Whether the active session has outlived its time budget
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.session_age().is_some_and(|age| age > self.timeout)
    }

    /// Time since the last recorded activity, if active
    #[must_use]
    pub fn idle_for(&self) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        self.inner
            .last_activity
            .lock()
            .ok()
            .and_then(|at| at.map(|t| t.elapsed()))
    }

    /// Whether the active session has gone quiet past the idle limit
    #[must_use]
    pub fn idle_timed_out(&self) -> bool {
        self.idle_for().is_some_and(|idle| idle > self.idle_timeout)
    }

    /// Whether the last deactivation was user-requested
    #[must_use]
    pub fn manually_slept(&self) -> bool {
        self.inner.manual_sleep.load(Ordering::SeqCst)
    }

    /// Enter the terminal shutdown phase
    pub fn begin_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.active.store(false, Ordering::SeqCst);
        tracing::info!("session shutting down");
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}

/// Spawn the session watchdog
///
/// Ticks at `interval` and expires any active session whose age exceeds
/// the session time budget, or that has gone quiet past the idle limit.
/// Expiry is silent: no spoken output, only a state transition the
/// command loop observes on its next check.
pub fn spawn_watchdog(session: Session, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if session.is_shutting_down() {
                break;
            }

            if session.is_active() {
                if session.timed_out() {
                    session.deactivate(DeactivationReason::SessionTimeout);
                } else if session.idle_timed_out() {
                    session.deactivate(DeactivationReason::IdleTimeout);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(3, Duration::from_secs(20), Duration::from_secs(30))
    }

    #[test]
    fn starts_dormant() {
        let s = session();
        assert_eq!(s.phase(), SessionPhase::Dormant);
        assert!(!s.is_active());
        assert!(s.session_age().is_none());
    }

    #[test]
    fn activation_resets_budget_and_clock() {
        let s = session();
        s.activate();
        s.record_command();
        s.record_command();
        s.record_command();
        assert!(s.budget_exhausted());

        s.deactivate(DeactivationReason::BudgetExhausted);
        s.activate();
        assert_eq!(s.command_count(), 0);
        assert!(!s.budget_exhausted());
    }

    #[test]
    fn deactivate_is_idempotent() {
        let s = session();
        s.activate();
        assert!(s.deactivate(DeactivationReason::SessionTimeout));
        assert!(!s.deactivate(DeactivationReason::SessionTimeout));
        assert!(!s.deactivate(DeactivationReason::UserRequested));
    }

    #[test]
    fn budget_counts_per_session() {
        let s = session();
        s.activate();
        assert_eq!(s.record_command(), 1);
        assert_eq!(s.record_command(), 2);
        assert!(!s.budget_exhausted());
        assert_eq!(s.record_command(), 3);
        assert!(s.budget_exhausted());
    }

    #[test]
    fn manual_sleep_tracked() {
        let s = session();
        s.activate();
        s.deactivate(DeactivationReason::UserRequested);
        assert!(s.manually_slept());

        s.activate();
        assert!(!s.manually_slept());
    }

    #[test]
    fn shutdown_is_terminal() {
        let s = session();
        s.begin_shutdown();
        assert_eq!(s.phase(), SessionPhase::Shutdown);

        s.activate();
        assert_eq!(s.phase(), SessionPhase::Shutdown);
        assert!(!s.is_active());
    }

    #[test]
    fn timeout_measured_from_activation() {
        let s = Session::new(3, Duration::from_millis(10), Duration::from_secs(60));
        s.activate();
        assert!(!s.timed_out());

        std::thread::sleep(Duration::from_millis(30));
        // Still timed out even though a command was just recorded; the
        // session clock runs from activation, not from the last command.
        s.record_command();
        assert!(s.timed_out());
    }

    #[test]
    fn idle_clock_resets_on_activity() {
        let s = Session::new(10, Duration::from_secs(60), Duration::from_millis(20));
        s.activate();

        std::thread::sleep(Duration::from_millis(40));
        assert!(s.idle_timed_out());

        s.record_command();
        assert!(!s.idle_timed_out());
    }

    #[tokio::test]
    async fn watchdog_expires_stale_sessions() {
        let s = Session::new(3, Duration::from_millis(20), Duration::from_secs(60));
        s.activate();

        let handle = spawn_watchdog(s.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!s.is_active());
        assert_eq!(s.phase(), SessionPhase::Dormant);

        s.begin_shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn watchdog_expires_idle_sessions() {
        let s = Session::new(3, Duration::from_secs(60), Duration::from_millis(20));
        s.activate();

        let handle = spawn_watchdog(s.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!s.is_active());

        s.begin_shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn watchdog_leaves_fresh_sessions_alone() {
        let s = Session::new(3, Duration::from_secs(60), Duration::from_secs(60));
        s.activate();

        let handle = spawn_watchdog(s.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(s.is_active());

        s.begin_shutdown();
        let _ = handle.await;
    }
}
