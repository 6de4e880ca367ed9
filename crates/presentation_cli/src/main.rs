//! Cadence CLI
//!
//! Command-line interface for speaking text, inspecting segmentation and
//! administering the audio cache.

#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use application::sentence_segmenter::{SegmenterConfig, SentenceSegmenter};
use application::{AudioCachePort, SpeechService, StreamingSpeaker, SynthesisOptions};
use clap::{Parser, Subcommand};
use domain::SpeechProfile;
use futures::stream::{self, BoxStream, StreamExt};
use infrastructure::{
    AppConfig, MokaAudioCache, PersistentAudioCache, PlaybackQueue, SynthesisAdapter,
    TelemetryConfig, init_tracing,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Longest time `speak` waits for queued audio to finish
const PLAYBACK_DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Cadence CLI
#[derive(Parser)]
#[command(name = "cadence-cli")]
#[command(author, version, about = "Cadence streaming text-to-speech CLI", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: ./cadence.toml if present)
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak text sentence by sentence as it is synthesized
    ///
    /// Example: cadence-cli speak "你好，主人！今天天气真好。"
    /// Example: some-llm | cadence-cli speak --stdin
    Speak {
        /// Text to speak (read from stdin if omitted)
        text: Option<String>,

        /// Stream text from stdin line by line
        #[arg(long)]
        stdin: bool,

        /// Mood in [-1, 1]
        #[arg(long, allow_negative_numbers = true)]
        mood: Option<f64>,

        /// Energy in [-1, 1]
        #[arg(long, allow_negative_numbers = true)]
        energy: Option<f64>,

        /// Speaking style tag forwarded to the backend
        #[arg(long)]
        style: Option<String>,

        /// Return once everything is queued instead of after playback
        #[arg(long)]
        no_wait: bool,
    },

    /// Show how text is split into sentences
    Segment {
        /// Text to split
        text: String,

        /// Minimum sentence length for strong endings
        #[arg(long)]
        min_length: Option<usize>,
    },

    /// Check that the synthesis backend answers
    Health,

    /// Inspect or clear the persistent audio cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Delete every cached clip
    Clear,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Build a speech profile if any of its inputs was given
fn profile_from_args(
    mood: Option<f64>,
    energy: Option<f64>,
    style: Option<String>,
) -> Option<SpeechProfile> {
    if mood.is_none() && energy.is_none() && style.is_none() {
        return None;
    }
    let profile = SpeechProfile::new(mood.unwrap_or_default(), energy.unwrap_or_default());
    Some(match style {
        Some(style) => profile.with_style(style),
        None => profile,
    })
}

/// Split `text` into sentences the way live speech would
fn segment_text(text: &str, config: SegmenterConfig) -> Vec<String> {
    let mut segmenter = SentenceSegmenter::new(config);
    let mut sentences = segmenter.feed(text);
    sentences.extend(segmenter.flush());
    sentences
}

/// Lines of stdin as a fragment stream, newlines kept
fn stdin_fragments() -> BoxStream<'static, String> {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line + "\n", lines)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                None
            },
        }
    })
    .boxed()
}

fn build_service(config: &AppConfig) -> anyhow::Result<SpeechService> {
    let adapter = SynthesisAdapter::new(config.synthesis.clone())?;
    let memory = MokaAudioCache::new(config.speech.memory_cache_size);
    let service = SpeechService::new(config.speech.clone(), Arc::new(adapter), Arc::new(memory))?;

    if config.disk_cache.enabled {
        let disk = PersistentAudioCache::open(config.disk_cache.clone())?;
        debug!(dir = %config.disk_cache.dir.display(), "Disk cache attached");
        Ok(service.with_disk_cache(Arc::new(disk)))
    } else {
        Ok(service)
    }
}

fn open_disk_cache(config: &AppConfig) -> anyhow::Result<PersistentAudioCache> {
    if !config.disk_cache.enabled {
        anyhow::bail!("disk cache is disabled in the configuration");
    }
    Ok(PersistentAudioCache::open(config.disk_cache.clone())?)
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref())?;
    config.validate().map_err(anyhow::Error::msg)?;

    // Verbosity decides the level, the config decides the format
    init_tracing(&TelemetryConfig {
        log_filter: log_filter_from_verbosity(cli.verbose).to_string(),
        ..config.telemetry.clone()
    })?;

    match cli.command {
        Commands::Speak {
            text,
            stdin,
            mood,
            energy,
            style,
            no_wait,
        } => {
            let service = Arc::new(build_service(&config)?);
            let playback = Arc::new(PlaybackQueue::from_config(&config.playback)?);
            let speaker = StreamingSpeaker::new(
                Arc::clone(&service),
                playback.clone(),
                config.speaker.clone(),
            );

            let mut options = SynthesisOptions::new();
            if let Some(profile) = profile_from_args(mood, energy, style) {
                options = options.with_profile(profile);
            }

            let report = match text {
                Some(text) if !stdin => speaker.speak_text(&text, &options).await,
                _ => speaker.speak(stdin_fragments(), &options).await,
            };

            if !no_wait && !playback.wait_until_idle(PLAYBACK_DRAIN_TIMEOUT) {
                println!("⚠️  Playback did not finish in time");
            }

            println!(
                "🔊 Spoke {} of {} sentence(s) ({} failed, {} skipped)",
                report.enqueued, report.sentences, report.failed, report.skipped
            );
            service.close().await;
            playback.shutdown();

            if report.failed > 0 {
                std::process::exit(1);
            }
        },

        Commands::Segment { text, min_length } => {
            let segmenter = min_length.map_or_else(
                || config.speaker.segmenter.clone(),
                SegmenterConfig::for_min_length,
            );
            for sentence in segment_text(&text, segmenter) {
                println!("{sentence}");
            }
        },

        Commands::Health => {
            let service = build_service(&config)?;
            if service.check_service().await {
                println!("✅ Healthy: {}", config.synthesis.api_url);
            } else {
                println!("❌ Unhealthy: {}", config.synthesis.api_url);
                std::process::exit(1);
            }
        },

        Commands::Cache { action } => {
            let cache = open_disk_cache(&config)?;
            match action {
                CacheAction::Stats => {
                    println!("📦 Audio cache ({}):", config.disk_cache.dir.display());
                    println!("{}", serde_json::to_string_pretty(&cache.stats())?);
                },
                CacheAction::Clear => {
                    cache.clear().await?;
                    println!("🧹 Cleared {}", config.disk_cache.dir.display());
                },
            }
        },

        Commands::Config => {
            print!("{}", config.to_toml()?);
        },
    }

    Ok(())
}
