use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use futures::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use comsigns_live::sources::{FrameEncoder, open_source};
use comsigns_live::types::CaptureRate;
use comsigns_live::{ErrorKind, LiveSession, SessionEvent, StreamConfig};

/// Stream frames to the ComSigns inference service and print predictions
#[derive(Debug, Parser)]
#[command(name = "comsigns-live", version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "COMSIGNS_CONFIG")]
    config: Option<PathBuf>,

    /// Socket url, overrides the configured endpoint
    #[arg(long)]
    url: Option<String>,

    /// Frame source: an image path or stub://<name> for a synthetic pattern
    #[arg(short, long, default_value = "stub://pattern")]
    source: String,

    /// Capture rate in frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over the flag
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(true)
        .with_level(true)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<StreamConfig> {
    let mut config = match &cli.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => StreamConfig::default(),
    };
    config = config.apply_env().context("applying environment overrides")?;

    if let Some(url) = &cli.url {
        config.endpoint = Some(url.clone());
    }
    if let Some(fps) = cli.fps {
        config.capture_fps = CaptureRate::new(fps)?;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let encoder = FrameEncoder::from_config(&config)?;
    let source = open_source(&cli.source, encoder);

    let session = LiveSession::connect(&config, source)?;
    let mut events = Box::pin(session.events());
    session.start()?;

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, stopping session");
                break Ok(());
            }
            event = events.next() => match event {
                Some(SessionEvent::Prediction(prediction)) => {
                    println!(
                        "{:<16} {:>3}%  {}",
                        prediction.gloss().unwrap_or("-"),
                        prediction.confidence_percent(),
                        prediction.accumulated_text().or(prediction.text()).unwrap_or(""),
                    );
                }
                Some(SessionEvent::StatusChanged(state)) => info!(%state, "Connection status"),
                Some(SessionEvent::SessionAssigned(_)) => {
                    let snapshot = session.snapshot();
                    info!(session = snapshot.short_session_id().unwrap_or("?"), "Session assigned");
                }
                Some(SessionEvent::ReconnectScheduled { attempt, delay }) => {
                    info!(attempt, "Reconnecting in {:.1}s", delay.as_secs_f64());
                }
                Some(SessionEvent::Error { kind: ErrorKind::DeviceUnavailable, message }) => {
                    break Err(anyhow::anyhow!(message));
                }
                Some(SessionEvent::Error { kind, message }) => warn!(?kind, "{}", message),
                None => break Ok(()),
            }
        }
    };

    session.stop()?;
    session.shutdown().await;

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => bail!("frame source unavailable: {e}"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(error = %err, "comsigns-live failed");
        std::process::exit(1);
    }
}
