//! Assistant orchestration
//!
//! Owns the dormant/active loop: wait for a wake word, serve a bounded
//! session of commands, return to dormant. Runs on the main task because
//! the cpal capture stream is not `Send`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::automation::DesktopAutomation;
use crate::config::Config;
use crate::dispatch::{Dispatcher, Effect};
use crate::memory::{ConversationMemory, Role};
use crate::model::{ChatMessage, ModelClient};
use crate::session::{spawn_watchdog, DeactivationReason, Session};
use crate::voice::{
    CpalSink, OpenAiSynthesizer, Recognizer, SpeechQueue, SpeechToText, WakeOutcome,
};
use crate::{Error, Result};

/// Watchdog tick interval
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

/// Whether the command loop should keep going
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// The assembled assistant
pub struct Assistant {
    config: Config,
    session: Session,
    queue: SpeechQueue,
    recognizer: Recognizer,
    dispatcher: Dispatcher,
    memory: ConversationMemory,
    model: Option<ModelClient>,
}

impl Assistant {
    /// Wire up all components from config
    ///
    /// # Errors
    ///
    /// Returns error if audio devices cannot be opened or the OpenAI key
    /// is missing (speech is not optional)
    pub fn new(config: Config) -> Result<Self> {
        let openai_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| Error::Config(format!("{} not set", crate::config::OPENAI_KEY_VAR)))?;

        let stt = SpeechToText::new(openai_key.clone(), config.settings.voice.stt_model.clone())?;
        let recognizer = Recognizer::new(
            stt,
            config.settings.recognition.clone(),
            config.settings.assistant.wake_words.clone(),
        )?;

        let synthesizer = OpenAiSynthesizer::new(
            openai_key,
            config.settings.voice.tts_model.clone(),
            config.settings.voice.tts_voice.clone(),
            config.settings.voice.tts_speed,
        )?;
        let sink = CpalSink::new(config.settings.voice.volume)?;

        let unmute_confirmation = pick(&config.settings.responses.unmute)
            .unwrap_or("I'm back.")
            .to_string();
        let queue = SpeechQueue::new(
            Arc::new(synthesizer),
            Arc::new(sink),
            config.scratch_dir.clone(),
            unmute_confirmation,
        )?;

        let automation = Arc::new(DesktopAutomation::new());
        let dispatcher = Dispatcher::new(&config, automation);

        let memory = ConversationMemory::load(
            config.history_file.clone(),
            config.settings.memory.max_history_length,
        );

        let model = match config.model_api_key.clone() {
            Some(key) => Some(ModelClient::new(
                key,
                config.settings.model.base_url.clone(),
                config.settings.model.model.clone(),
                config.settings.model.temperature,
                config.settings.model.max_tokens,
            )?),
            None => {
                tracing::warn!(
                    "{} not set, conversation fallback disabled",
                    crate::config::MODEL_KEY_VAR
                );
                None
            }
        };

        let session = Session::new(
            config.settings.session.command_budget,
            Duration::from_secs(config.settings.session.timeout_secs),
            Duration::from_secs(config.settings.session.idle_timeout_secs),
        );

        Ok(Self {
            config,
            session,
            queue,
            recognizer,
            dispatcher,
            memory,
            model,
        })
    }

    /// Run until an exit command or interrupt
    ///
    /// # Errors
    ///
    /// Returns error only for unrecoverable failures; routine recognition
    /// errors are absorbed by the loop
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> Result<()> {
        let mut interrupt_rx = spawn_interrupt_listener();

        self.recognizer.calibrate().await;

        let watchdog = spawn_watchdog(self.session.clone(), WATCHDOG_INTERVAL);

        let name = self.config.settings.assistant.name.clone();
        let wake_word = self.config.settings.assistant.wake_words[0].clone();
        tracing::info!(name = %name, wake_word = %wake_word, "assistant ready");
        self.queue
            .enqueue(format!("{name} online. Say {wake_word} when you need me."), false);
        self.queue.wait_until_done();

        loop {
            if self.session.is_shutting_down() {
                break;
            }

            tokio::select! {
                _ = interrupt_rx.recv() => {
                    tracing::info!("interrupt received");
                    break;
                }
                outcome = self.recognizer.detect_wake_word() => {
                    if let WakeOutcome::Detected { command } = outcome {
                        self.session.activate();
                        if self.run_session(command, &mut interrupt_rx).await == Flow::Shutdown {
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown();
        let _ = watchdog.await;
        Ok(())
    }

    /// Serve one active session
    async fn run_session(
        &mut self,
        bundled: Option<String>,
        interrupt_rx: &mut mpsc::Receiver<()>,
    ) -> Flow {
        let mut failures: u32 = 0;
        let max_failures = self.config.settings.session.max_failures;

        if let Some(greeting) = pick(&self.config.settings.responses.greetings) {
            self.queue.enqueue(greeting, false);
            self.queue.wait_until_done();
        }

        // A command bundled with the wake word is served before the
        // listen loop starts.
        if let Some(cmd) = bundled {
            self.session.record_command();
            if self.handle_command(&cmd).await == Flow::Shutdown {
                return Flow::Shutdown;
            }
            if self.session.budget_exhausted() {
                self.session.deactivate(DeactivationReason::BudgetExhausted);
                return Flow::Continue;
            }
        }

        while self.session.is_active() {
            tokio::select! {
                _ = interrupt_rx.recv() => {
                    tracing::info!("interrupt received");
                    return Flow::Shutdown;
                }
                result = self.recognizer.listen() => {
                    // The watchdog may have expired the session mid-listen;
                    // expiry is silent, so just fall out of the loop.
                    if !self.session.is_active() {
                        break;
                    }

                    match result {
                        Ok(command) => {
                            failures = 0;
                            self.session.record_command();
                            if self.handle_command(&command).await == Flow::Shutdown {
                                return Flow::Shutdown;
                            }
                            if self.session.budget_exhausted() {
                                self.session.deactivate(DeactivationReason::BudgetExhausted);
                                break;
                            }
                        }
                        Err(failure) => {
                            failures += 1;
                            tracing::debug!(
                                error = %failure,
                                failures = failures,
                                "recognition failure"
                            );
                            if failures >= max_failures {
                                self.session
                                    .deactivate(DeactivationReason::RecognitionFailures);
                                break;
                            }
                        }
                    }
                }
            }
        }

        Flow::Continue
    }

    /// Dispatch one command and apply its effect
    async fn handle_command(&mut self, command: &str) -> Flow {
        let result = self.dispatcher.dispatch(command);

        match result.effect {
            Effect::None => {
                if let Some(outcome) = result.outcome {
                    if !outcome.success {
                        tracing::warn!(message = %outcome.message, "command failed");
                    }
                    self.queue.enqueue(clean_for_speech(&outcome.message), false);
                    self.queue.wait_until_done();
                }
            }
            Effect::Mute => {
                if !self.queue.is_muted() {
                    self.queue.toggle_mute();
                }
            }
            Effect::Unmute => {
                if self.queue.is_muted() {
                    self.queue.toggle_mute();
                    self.queue.wait_until_done();
                }
            }
            Effect::Sleep => {
                // The only deactivation that speaks.
                if let Some(message) = pick(&self.config.settings.responses.sleep) {
                    self.queue.enqueue(message, false);
                    self.queue.wait_until_done();
                }
                self.session.deactivate(DeactivationReason::UserRequested);
            }
            Effect::Exit => {
                if let Some(farewell) = pick(&self.config.settings.responses.goodbyes) {
                    self.queue.enqueue(farewell, false);
                    self.queue.wait_until_done();
                }
                self.session.begin_shutdown();
                return Flow::Shutdown;
            }
            Effect::Conversation => self.converse(command).await,
        }

        Flow::Continue
    }

    /// Answer through the language model, with memory
    async fn converse(&mut self, text: &str) {
        self.memory.add_turn(Role::User, text);

        let Some(model) = &self.model else {
            if let Some(message) = pick(&self.config.settings.responses.errors) {
                self.queue.enqueue(message, false);
                self.queue.wait_until_done();
            }
            return;
        };

        // Cover the round-trip latency with a spoken acknowledgment.
        if let Some(ack) = pick(&self.config.settings.responses.acknowledgments) {
            self.queue.enqueue(ack, true);
        }

        let mut messages = vec![ChatMessage::system(self.config.system_prompt())];
        messages.extend(
            self.memory
                .messages_for_model(self.config.settings.model.context_turns),
        );

        match model.respond(&messages).await {
            Ok(reply) => {
                self.memory.add_turn(Role::Assistant, reply.clone());
                self.queue.enqueue(clean_for_speech(&reply), false);
                self.queue.wait_until_done();
            }
            Err(e) => {
                tracing::error!(error = %e, "conversation fallback failed");
                // The turn still lands in memory, even with nothing said.
                self.memory.add_turn(Role::Assistant, "");
                if let Some(message) = pick(&self.config.settings.responses.errors) {
                    self.queue.enqueue(message, false);
                    self.queue.wait_until_done();
                }
            }
        }
    }

    /// Final teardown; speaks a farewell unless one was already spoken
    fn shutdown(&mut self) {
        if !self.session.is_shutting_down() {
            self.session.begin_shutdown();
            if let Some(farewell) = pick(&self.config.settings.responses.goodbyes) {
                // Unmute so the farewell is audible.
                if self.queue.is_muted() {
                    self.queue.toggle_mute();
                }
                self.queue.enqueue(farewell, false);
                self.queue.wait_until_done();
            }
        }
        tracing::info!("assistant stopped");
    }
}

/// Forward Ctrl-C as a message the select loops can race against
fn spawn_interrupt_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(()).await;
        }
    });
    rx
}

/// Pick a random canned response from a pool
fn pick(pool: &[String]) -> Option<&str> {
    use rand::seq::SliceRandom;
    pool.choose(&mut rand::thread_rng()).map(String::as_str)
}

/// Strip formatting that reads badly aloud
///
/// Model replies arrive as markdown-ish text; speech wants plain sentences.
/// Keeps letters, digits, and basic punctuation (apostrophes included, so
/// contractions survive), turns newlines into sentence pauses, and
/// collapses whitespace.
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    let mut cleaned = text.replace('\n', ". ");
    for pattern in ["**", "*", "##", "#", "```", "`", "__", "~~"] {
        cleaned = cleaned.replace(pattern, "");
    }
    cleaned = cleaned.replace("...", ". ").replace("Error:", "Sorry,");

    let cleaned: String = cleaned
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || " .,!?-:()'".contains(*c))
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
