use anyhow::Result;
use bytes::Bytes;
use clap::{Arg, Command};
use tracing::{info, warn};

mod config;
mod engines;
mod error;
mod factory;
mod orchestrator;
mod transcript;

use crate::config::AsrConfig;
use crate::factory::{build_engine, build_orchestrator};
use crate::transcript::TranscriptResult;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("pod_asr=info,warn")
        .init();

    let matches = Command::new("pod-asr")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Multi-engine speech transcription orchestrator")
        .arg(
            Arg::new("input")
                .value_name("FILE_OR_URL")
                .help("Audio file to transcribe (or a URL with --url)")
                .required(true)
        )
        .arg(
            Arg::new("url")
                .long("url")
                .help("Treat the input as an audio URL instead of a local file")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("strategy")
                .short('s')
                .long("strategy")
                .value_name("STRATEGY")
                .help("Dispatch strategy: fallback, race, or mixed")
                .default_value("fallback")
        )
        .arg(
            Arg::new("engine")
                .short('e')
                .long("engine")
                .value_name("NAME")
                .help("Run a single engine instead of the orchestrator")
        )
        .get_matches();

    let input = matches
        .get_one::<String>("input")
        .cloned()
        .unwrap_or_default();
    let use_url = matches.get_flag("url");
    let strategy = matches
        .get_one::<String>("strategy")
        .cloned()
        .unwrap_or_else(|| "fallback".to_string());
    let engine_name = matches.get_one::<String>("engine").cloned();

    // Load configuration
    let config = AsrConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        AsrConfig::default()
    });

    info!("🎙️ pod-asr starting...");

    let start_time = std::time::Instant::now();
    let result = if use_url {
        let name = engine_name.unwrap_or_else(|| config.orchestrator.primary.clone());
        info!("🔗 Transcribing URL with engine: {}", name);
        let engine = build_engine(&name, &config)?;
        engine.transcribe_url(&input).await?
    } else {
        let audio = Bytes::from(tokio::fs::read(&input).await?);
        info!("🎧 Loaded {} bytes from {}", audio.len(), input);

        match engine_name {
            Some(name) => {
                info!("🔊 Transcribing with single engine: {}", name);
                let engine = build_engine(&name, &config)?;
                engine.transcribe(audio).await?
            }
            None => {
                let orchestrator = build_orchestrator(&config)?;
                info!("🧭 Strategy: {}", strategy);
                match strategy.as_str() {
                    "fallback" => orchestrator.transcribe_with_fallback(audio).await?,
                    "race" => orchestrator.transcribe_with_race(audio).await?,
                    "mixed" => orchestrator.transcribe_with_mixed(audio).await?,
                    other => {
                        return Err(anyhow::anyhow!("unknown strategy: {}", other));
                    }
                }
            }
        }
    };

    let duration = start_time.elapsed();
    print_summary(&result, duration.as_secs_f64());
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

fn print_summary(result: &TranscriptResult, elapsed_secs: f64) {
    info!("🎉 Transcription completed in {:.2}s", elapsed_secs);
    info!("🏷️ Engine: {}", result.engine);
    info!("⏱️ Audio duration: {}ms", result.duration_ms);
    info!("📝 {} words, {} utterances", result.words.len(), result.utterances.len());
    if !result.log_id.is_empty() {
        info!("🧾 Vendor log id: {}", result.log_id);
    }
}
