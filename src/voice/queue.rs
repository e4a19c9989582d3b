//! Speech playback queue
//!
//! One dedicated worker thread drains a FIFO of utterances. Each utterance
//! is split into sentence segments; every segment is synthesized to a
//! scratch MP3 artifact, played, and deleted. Segment failures are logged
//! and skipped so one bad synthesis never silences the rest of the queue.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::voice::playback::AudioSink;
use crate::voice::tts::Synthesizer;
use crate::{Error, Result};

/// One queued utterance
///
/// The priority flag is carried for interface compatibility and logged, but
/// dequeue order is strictly FIFO.
#[derive(Debug, Clone)]
pub struct SpeechItem {
    pub text: String,
    pub priority: bool,
}

struct QueueState {
    items: VecDeque<SpeechItem>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    muted: AtomicBool,
    speaking: AtomicBool,
    /// Set by `stop()`; aborts the in-flight utterance at the next segment
    /// boundary (or mid-segment, via the sink's cancel polling).
    interrupt: AtomicBool,
}

/// FIFO speech queue with a dedicated playback worker
pub struct SpeechQueue {
    shared: Arc<Shared>,
    worker: Option<std::thread::JoinHandle<()>>,
    unmute_confirmation: String,
}

impl SpeechQueue {
    /// Create the queue and spawn its worker thread
    ///
    /// The scratch directory is created (and swept of leftover artifacts
    /// from a previous run) before the worker starts.
    ///
    /// # Errors
    ///
    /// Returns error if the scratch directory cannot be prepared
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        scratch_dir: PathBuf,
        unmute_confirmation: String,
    ) -> Result<Self> {
        std::fs::create_dir_all(&scratch_dir)?;
        sweep_scratch(&scratch_dir);

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            muted: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            interrupt: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("speech-queue".to_string())
            .spawn(move || worker_loop(&worker_shared, &*synthesizer, &*sink, &scratch_dir))
            .map_err(|e| Error::Playback(format!("worker spawn failed: {e}")))?;

        Ok(Self {
            shared,
            worker: Some(worker),
            unmute_confirmation,
        })
    }

    /// Append an utterance; no-op while muted or shut down
    pub fn enqueue(&self, text: impl Into<String>, priority: bool) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }

        if self.shared.muted.load(Ordering::SeqCst) {
            tracing::debug!(text = %text, "dropping utterance while muted");
            return;
        }

        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if state.shutdown {
            return;
        }

        tracing::debug!(text = %text, priority = priority, "utterance enqueued");
        state.items.push_back(SpeechItem { text, priority });
        self.shared.wake.notify_one();
    }

    /// Drop pending utterances and halt the in-flight one
    ///
    /// Safe from any state, including mid-synthesis; `is_speaking` clears
    /// within one sink poll interval.
    pub fn stop(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            self.shared.interrupt.store(true, Ordering::SeqCst);
            let dropped = state.items.len();
            state.items.clear();
            if dropped > 0 {
                tracing::debug!(dropped = dropped, "pending utterances dropped");
            }
        }
    }

    /// Flip the mute state; returns the new state
    ///
    /// Muting behaves as `stop()` plus suppression of later enqueues;
    /// unmuting enqueues a spoken confirmation.
    pub fn toggle_mute(&self) -> bool {
        let now_muted = !self.shared.muted.load(Ordering::SeqCst);

        if now_muted {
            self.shared.muted.store(true, Ordering::SeqCst);
            self.stop();
            tracing::info!("speech muted");
        } else {
            self.shared.muted.store(false, Ordering::SeqCst);
            tracing::info!("speech unmuted");
            self.enqueue(self.unmute_confirmation.clone(), false);
        }

        now_muted
    }

    /// Whether speech output is currently suppressed
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    /// Whether the worker is mid-utterance
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::SeqCst)
    }

    /// Whether anything is pending or in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        if self.is_speaking() {
            return true;
        }
        self.shared
            .state
            .lock()
            .map(|s| !s.items.is_empty())
            .unwrap_or(false)
    }

    /// Block until the queue is drained and the worker is idle
    pub fn wait_until_done(&self) {
        while self.is_busy() {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
            self.shared.interrupt.store(true, Ordering::SeqCst);
            state.items.clear();
        }
        self.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    shared: &Shared,
    synthesizer: &dyn Synthesizer,
    sink: &dyn AudioSink,
    scratch_dir: &std::path::Path,
) {
    loop {
        let item = {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(item) = state.items.pop_front() {
                    // Reset under the lock so a concurrent stop() either
                    // cleared this item first or lands after the reset.
                    shared.interrupt.store(false, Ordering::SeqCst);
                    break item;
                }
                state = match shared.wake.wait(state) {
                    Ok(s) => s,
                    Err(_) => return,
                };
            }
        };

        if shared.muted.load(Ordering::SeqCst) {
            continue;
        }

        shared.speaking.store(true, Ordering::SeqCst);
        speak_item(shared, synthesizer, sink, scratch_dir, &item);
        shared.speaking.store(false, Ordering::SeqCst);
    }
}

fn speak_item(
    shared: &Shared,
    synthesizer: &dyn Synthesizer,
    sink: &dyn AudioSink,
    scratch_dir: &std::path::Path,
    item: &SpeechItem,
) {
    tracing::debug!(text = %item.text, priority = item.priority, "speaking utterance");

    for segment in split_sentences(&item.text) {
        if shared.interrupt.load(Ordering::SeqCst) || shared.muted.load(Ordering::SeqCst) {
            tracing::debug!("utterance aborted");
            return;
        }

        let audio = match synthesizer.synthesize(segment) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, segment = %segment, "synthesis failed, skipping segment");
                continue;
            }
        };

        // stop() may have landed during the (uncancellable) synthesis call.
        if shared.interrupt.load(Ordering::SeqCst) {
            tracing::debug!("utterance aborted");
            return;
        }

        let path = scratch_dir.join(format!("segment_{}.mp3", uuid::Uuid::new_v4()));
        if let Err(e) = std::fs::write(&path, &audio) {
            tracing::warn!(error = %e, "failed to write audio artifact, skipping segment");
            continue;
        }

        if let Err(e) = sink.play(&path, &shared.interrupt) {
            tracing::warn!(error = %e, segment = %segment, "playback failed, skipping segment");
        }

        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete audio artifact");
        }
    }
}

/// Split text into speakable sentence segments
///
/// Splits on sentence-ending punctuation and drops empty fragments, so
/// "Hello. How are you?" yields two segments.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Delete leftover artifacts from a previous run
fn sweep_scratch(scratch_dir: &std::path::Path) {
    let Ok(entries) = std::fs::read_dir(scratch_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "mp3") {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminators() {
        assert_eq!(
            split_sentences("Hello. How are you? Great!"),
            vec!["Hello", "How are you", "Great"]
        );
    }

    #[test]
    fn empty_fragments_dropped() {
        assert_eq!(split_sentences("One...  Two.."), vec!["One", "Two"]);
        assert!(split_sentences("...").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn unterminated_text_is_one_segment() {
        assert_eq!(split_sentences("no punctuation here"), vec!["no punctuation here"]);
    }
}
