use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use vesper::memory::{ConversationMemory, ExportFormat};
use vesper::voice::{AudioSink, CpalSink, OpenAiSynthesizer, Synthesizer};
use vesper::{Assistant, Config, Error};

/// Vesper - wake-word driven desktop voice assistant
#[derive(Parser)]
#[command(name = "vesper", version, about)]
struct Cli {
    /// Config file path (default: ~/.config/vesper/config.toml)
    #[arg(short, long, env = "VESPER_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoryFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Command {
    /// Export conversation history next to the history file
    ExportHistory {
        /// Export format
        #[arg(short, long, value_enum, default_value = "json")]
        format: HistoryFormat,
    },
    /// Search conversation history
    SearchHistory {
        /// Substring to look for (case-insensitive)
        query: String,
    },
    /// Show conversation history statistics
    HistoryStats,
    /// Delete all conversation history
    ClearHistory,
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,vesper=info",
        1 => "info,vesper=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::ExportHistory { format } => export_history(&config, format),
            Command::SearchHistory { query } => search_history(&config, &query),
            Command::HistoryStats => history_stats(&config),
            Command::ClearHistory => clear_history(&config),
            Command::TestSpeaker => test_speaker(&config),
            Command::TestTts { text } => test_tts(&config, &text),
        };
    }

    let assistant = Assistant::new(config)?;
    assistant.run().await?;

    Ok(())
}

fn load_memory(config: &Config) -> ConversationMemory {
    ConversationMemory::load(
        config.history_file.clone(),
        config.settings.memory.max_history_length,
    )
}

/// Export conversation history
fn export_history(config: &Config, format: HistoryFormat) -> anyhow::Result<()> {
    let memory = load_memory(config);
    let format = match format {
        HistoryFormat::Json => ExportFormat::Json,
        HistoryFormat::Text => ExportFormat::Text,
    };

    let path = memory.export(format)?;
    println!("Exported {} turns to {}", memory.turns().len(), path.display());
    Ok(())
}

/// Search conversation history
fn search_history(config: &Config, query: &str) -> anyhow::Result<()> {
    let memory = load_memory(config);
    let matches = memory.search(query);

    if matches.is_empty() {
        println!("No turns matching \"{query}\"");
        return Ok(());
    }

    for turn in matches {
        println!(
            "[{}] {}: {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.role,
            turn.content
        );
    }
    Ok(())
}

/// Show conversation history statistics
fn history_stats(config: &Config) -> anyhow::Result<()> {
    let memory = load_memory(config);
    let stats = memory.statistics();

    println!("Total turns:     {}", stats.total_turns);
    println!("User turns:      {}", stats.user_turns);
    println!("Assistant turns: {}", stats.assistant_turns);
    if let Some(first) = stats.first_timestamp {
        println!("First turn:      {}", first.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(last) = stats.last_timestamp {
        println!("Last turn:       {}", last.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

/// Delete all conversation history
fn clear_history(config: &Config) -> anyhow::Result<()> {
    let mut memory = load_memory(config);
    let count = memory.turns().len();
    memory.clear();
    println!("Cleared {count} turns");
    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new(config.settings.voice.volume)?;

    let sample_rate = 24000_i32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    sink.play_samples(samples, &AtomicBool::new(false))?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output
fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let api_key = config
        .openai_api_key
        .clone()
        .ok_or_else(|| Error::Config(format!("{} not set", vesper::config::OPENAI_KEY_VAR)))?;

    let synthesizer = OpenAiSynthesizer::new(
        api_key,
        config.settings.voice.tts_model.clone(),
        config.settings.voice.tts_voice.clone(),
        config.settings.voice.tts_speed,
    )?;

    // The synthesizer uses a blocking HTTP client, which must not run on a
    // runtime thread.
    let text = text.to_string();
    let mp3_data = std::thread::spawn(move || synthesizer.synthesize(&text))
        .join()
        .map_err(|_| Error::Tts("synthesis thread panicked".to_string()))??;
    println!("Got {} bytes of audio data", mp3_data.len());

    let scratch = config.scratch_dir.clone();
    std::fs::create_dir_all(&scratch)?;
    let path = scratch.join(format!("test_{}.mp3", uuid::Uuid::new_v4()));
    std::fs::write(&path, &mp3_data)?;

    println!("Playing audio...");
    let sink = CpalSink::new(config.settings.voice.volume)?;
    let result = sink.play(&path, &AtomicBool::new(false));
    let _ = std::fs::remove_file(&path);
    result?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
