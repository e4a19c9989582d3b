//! Playback queue integration tests
//!
//! Exercise the queue contract with fake synthesis and playback so no audio
//! hardware or network is needed.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vesper::voice::{AudioSink, SpeechQueue, Synthesizer};

/// Records synthesized segments; optionally fails on a marker substring
struct FakeSynthesizer {
    synthesized: Arc<Mutex<Vec<String>>>,
    fail_on: Option<&'static str>,
}

impl Synthesizer for FakeSynthesizer {
    fn synthesize(&self, text: &str) -> vesper::Result<Vec<u8>> {
        if let Some(marker) = self.fail_on {
            if text.contains(marker) {
                return Err(vesper::Error::Tts("synthetic failure".to_string()));
            }
        }
        self.synthesized.lock().unwrap().push(text.to_string());
        Ok(text.as_bytes().to_vec())
    }
}

/// Records played artifact contents; simulates playback time and honors cancel
struct FakeSink {
    played: Arc<Mutex<Vec<String>>>,
    play_time: Duration,
}

impl AudioSink for FakeSink {
    fn play(&self, path: &Path, cancel: &AtomicBool) -> vesper::Result<()> {
        let content = std::fs::read_to_string(path).unwrap();

        let deadline = Instant::now() + self.play_time;
        while Instant::now() < deadline {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        self.played.lock().unwrap().push(content);
        Ok(())
    }
}

struct Harness {
    queue: SpeechQueue,
    synthesized: Arc<Mutex<Vec<String>>>,
    played: Arc<Mutex<Vec<String>>>,
    scratch: tempfile::TempDir,
}

fn harness(play_time: Duration, fail_on: Option<&'static str>) -> Harness {
    let synthesized = Arc::new(Mutex::new(Vec::new()));
    let played = Arc::new(Mutex::new(Vec::new()));
    let scratch = tempfile::tempdir().unwrap();

    let queue = SpeechQueue::new(
        Arc::new(FakeSynthesizer {
            synthesized: Arc::clone(&synthesized),
            fail_on,
        }),
        Arc::new(FakeSink {
            played: Arc::clone(&played),
            play_time,
        }),
        scratch.path().to_path_buf(),
        "Speech restored.".to_string(),
    )
    .unwrap();

    Harness {
        queue,
        synthesized,
        played,
        scratch,
    }
}

fn instant() -> Duration {
    Duration::from_millis(0)
}

#[test]
fn playback_is_fifo_regardless_of_priority() {
    let h = harness(instant(), None);

    h.queue.enqueue("first", false);
    h.queue.enqueue("second", true);
    h.queue.enqueue("third", false);
    h.queue.wait_until_done();

    assert_eq!(*h.played.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn utterances_split_into_sentence_segments() {
    let h = harness(instant(), None);

    h.queue.enqueue("Hello. How are you? Great!", false);
    h.queue.wait_until_done();

    assert_eq!(
        *h.played.lock().unwrap(),
        vec!["Hello", "How are you", "Great"]
    );
}

#[test]
fn artifacts_deleted_after_playback() {
    let h = harness(instant(), None);

    h.queue.enqueue("One. Two. Three.", false);
    h.queue.wait_until_done();

    let leftovers: Vec<_> = std::fs::read_dir(h.scratch.path())
        .unwrap()
        .flatten()
        .collect();
    assert!(leftovers.is_empty(), "scratch dir should be empty");
}

#[test]
fn enqueue_while_muted_is_dropped() {
    let h = harness(instant(), None);

    assert!(h.queue.toggle_mute());
    h.queue.enqueue("never spoken", false);
    h.queue.wait_until_done();

    assert!(h.played.lock().unwrap().is_empty());
    assert!(h.synthesized.lock().unwrap().is_empty());
}

#[test]
fn unmute_speaks_exactly_one_confirmation() {
    let h = harness(instant(), None);

    assert!(h.queue.toggle_mute());
    h.queue.enqueue("dropped while muted", false);
    assert!(!h.queue.toggle_mute());
    h.queue.wait_until_done();

    assert_eq!(*h.played.lock().unwrap(), vec!["Speech restored"]);
}

#[test]
fn mute_state_follows_toggle_parity() {
    let h = harness(instant(), None);

    assert!(!h.queue.is_muted());
    assert!(h.queue.toggle_mute());
    assert!(h.queue.is_muted());
    assert!(!h.queue.toggle_mute());
    assert!(!h.queue.is_muted());
}

#[test]
fn stop_drops_pending_and_halts_current() {
    let h = harness(Duration::from_millis(400), None);

    h.queue.enqueue("alpha", false);
    h.queue.enqueue("beta", false);
    h.queue.enqueue("gamma", false);

    // Let the first utterance get in flight, then cut everything.
    std::thread::sleep(Duration::from_millis(100));
    assert!(h.queue.is_speaking());
    h.queue.stop();
    h.queue.wait_until_done();

    // The in-flight segment was cancelled (so never finished playing) and
    // the pending ones never started.
    assert!(h.played.lock().unwrap().is_empty());
    let synthesized = h.synthesized.lock().unwrap();
    assert_eq!(*synthesized, vec!["alpha"]);
}

#[test]
fn stop_is_safe_when_idle_and_queue_stays_usable() {
    let h = harness(instant(), None);

    h.queue.stop();
    h.queue.stop();

    h.queue.enqueue("after stop", false);
    h.queue.wait_until_done();

    assert_eq!(*h.played.lock().unwrap(), vec!["after stop"]);
}

#[test]
fn synthesis_failure_skips_segment_only() {
    let h = harness(instant(), Some("bad"));

    h.queue.enqueue("good start. bad middle. good end.", false);
    h.queue.wait_until_done();

    assert_eq!(
        *h.played.lock().unwrap(),
        vec!["good start", "good end"]
    );
}

#[test]
fn speaking_flag_tracks_worker() {
    let h = harness(Duration::from_millis(200), None);

    assert!(!h.queue.is_speaking());
    h.queue.enqueue("hello", false);

    // Becomes true once the worker picks the item up.
    let deadline = Instant::now() + Duration::from_secs(2);
    while !h.queue.is_speaking() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(h.queue.is_speaking());

    h.queue.wait_until_done();
    assert!(!h.queue.is_speaking());
}

#[test]
fn empty_and_blank_text_ignored() {
    let h = harness(instant(), None);

    h.queue.enqueue("", false);
    h.queue.enqueue("   ", false);
    h.queue.wait_until_done();

    assert!(h.synthesized.lock().unwrap().is_empty());
}

#[test]
fn leftover_artifacts_swept_at_startup() {
    let scratch = tempfile::tempdir().unwrap();
    let stale = scratch.path().join("segment_stale.mp3");
    std::fs::write(&stale, b"stale").unwrap();

    let _queue = SpeechQueue::new(
        Arc::new(FakeSynthesizer {
            synthesized: Arc::new(Mutex::new(Vec::new())),
            fail_on: None,
        }),
        Arc::new(FakeSink {
            played: Arc::new(Mutex::new(Vec::new())),
            play_time: instant(),
        }),
        scratch.path().to_path_buf(),
        "ok".to_string(),
    )
    .unwrap();

    assert!(!stale.exists());
}
