//! Vesper - wake-word driven desktop voice assistant
//!
//! Dormant until spoken to, Vesper transcribes commands through a cloud STT
//! API, routes them through ordered dispatch families (desktop automation,
//! media control, power, time), and falls back to a chat model for anything
//! unclaimed. Replies are spoken through a FIFO playback queue.
//!
//! ```text
//!  microphone ──> recognizer ──> wake word ──> session
//!                                                 │
//!                                           dispatcher ──> automation / media
//!                                                 │
//!                                            model fallback (+ memory)
//!                                                 │
//!                                          speech queue ──> TTS ──> speaker
//! ```

pub mod assistant;
pub mod automation;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod memory;
pub mod model;
pub mod session;
pub mod voice;

pub use assistant::Assistant;
pub use config::Config;
pub use error::{Error, Result};
pub use session::{DeactivationReason, Session, SessionPhase};
