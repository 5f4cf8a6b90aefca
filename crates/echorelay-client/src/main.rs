use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use echorelay_client::network::{GenerationClient, TranscriptionSession};
use echorelay_client::{AppConfig, LoggingSink, RelayError, RelayOrchestrator};

/// 16 kHz mono 16-bit PCM, 40 ms per frame
const PCM_CHUNK_BYTES: usize = 1280;
const PCM_CHUNK_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Parser)]
#[command(
    name = "echorelay",
    about = "Echo call through a realtime session broker",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Push local media to the broker and pull it back until Ctrl-C
    Call,

    /// Generate a video from a prompt
    Video { prompt: String },

    /// Generate an image from a prompt
    Image { prompt: String },

    /// Transcribe a raw 16 kHz mono PCM file
    Transcribe { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "echorelay=debug,echorelay_client=debug,echorelay_media=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Call => run_call(config).await,
        Commands::Video { prompt } => {
            let client = GenerationClient::new(config.generation)?;
            let video = client.generate_video(&prompt).await?;
            println!("{}", video.url);
            if let Some(cover) = video.cover_image_url {
                println!("cover: {}", cover);
            }
            Ok(())
        }
        Commands::Image { prompt } => {
            let client = GenerationClient::new(config.generation)?;
            println!("{}", client.generate_image(&prompt).await?);
            Ok(())
        }
        Commands::Transcribe { file } => run_transcription(config, file).await,
    }
}

async fn run_call(config: AppConfig) -> Result<()> {
    config.validate()?;
    tracing::info!("Starting echo call...");

    let relay = Arc::new(RelayOrchestrator::from_config(
        &config,
        Arc::new(LoggingSink::new()),
    )?);

    let setup = tokio::spawn({
        let relay = relay.clone();
        async move { relay.start().await }
    });

    tokio::select! {
        joined = setup => {
            match joined.context("setup task panicked")? {
                Ok(()) => {
                    tracing::info!("Echo call running, press Ctrl-C to hang up");
                    tokio::signal::ctrl_c().await?;
                }
                Err(RelayError::Cancelled) => {}
                Err(e) => return Err(e.into()),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted during setup");
        }
    }

    relay.stop().await;
    tracing::info!("Echo call ended ({})", relay.state());
    Ok(())
}

async fn run_transcription(config: AppConfig, file: PathBuf) -> Result<()> {
    let pcm = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let mut session = TranscriptionSession::connect(&config.speech).await?;
    for chunk in pcm.chunks(PCM_CHUNK_BYTES) {
        session.send_audio(chunk).await?;
        tokio::time::sleep(PCM_CHUNK_INTERVAL).await;
    }

    println!("{}", session.finish().await?);
    Ok(())
}
