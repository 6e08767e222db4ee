//! Streaming player (tsp-player) - command-line entry point
//!
//! Plays WAV files or base64 chunks from stdin through the streaming
//! controller, the same way a TTS front end would feed it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsp_common::{OutputBackendKind, PlayerConfig};
use tsp_player::audio::output::list_devices;
use tsp_player::audio::wav::encode_pcm_wav;
use tsp_player::playback::controller::decode_payload;
use tsp_player::{StreamController, TicketId};

/// Command-line arguments for tsp-player
#[derive(Parser, Debug)]
#[command(name = "tsp-player")]
#[command(about = "Gapless player for incrementally delivered WAV chunks")]
#[command(version)]
struct Args {
    /// WAV files to play in order
    files: Vec<PathBuf>,

    /// Read one base64 (or data-URL) chunk per line from stdin
    #[arg(long)]
    stdin: bool,

    /// Treat inputs as raw 16-bit mono PCM at this rate
    #[arg(long, value_name = "HZ")]
    raw_pcm_rate: Option<u32>,

    /// Config file (overrides TSP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the clock-driven null output instead of an audio device
    #[arg(long)]
    null_output: bool,

    /// Print stream events as JSON lines on stdout
    #[arg(long)]
    events: bool,

    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsp_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.list_devices {
        for name in list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.null_output {
        config.output.backend = OutputBackendKind::Null;
    }

    let controller = Arc::new(StreamController::new(config).context("Invalid player configuration")?);
    let status = controller.init().context("Failed to initialize audio output")?;
    if status.suspended {
        info!("Audio context starts suspended; it resumes when the stream starts");
    }

    if args.events {
        spawn_event_printer(Arc::clone(&controller));
    }

    controller.start_stream();

    tokio::select! {
        result = play_inputs(Arc::clone(&controller), &args) => {
            if let Err(e) = result {
                warn!("Playback ended early: {:#}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    let stats = controller.pump_stats();
    info!(
        "Played {:.2}s, {} underruns",
        controller.current_time(),
        stats.underrun_count
    );

    controller.destroy();
    Ok(())
}

/// Submit every input in order, then wait for the last accepted chunk
async fn play_inputs(controller: Arc<StreamController>, args: &Args) -> Result<()> {
    let mut last_ticket = TicketId::INVALID;

    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let wav = match args.raw_pcm_rate {
            Some(rate) => encode_pcm_wav(&bytes, rate, 1, 16),
            None => bytes,
        };

        match controller.try_add_wav(&wav) {
            Ok(ticket) => {
                info!("Queued {} as ticket {}", path.display(), ticket);
                last_ticket = ticket;
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    if args.stdin {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }

            let ticket = match args.raw_pcm_rate {
                Some(rate) => decode_payload(&line)
                    .and_then(|pcm| controller.try_add_wav(&encode_pcm_wav(&pcm, rate, 1, 16)))
                    .unwrap_or(TicketId::INVALID),
                None => controller.add_data(&line),
            };

            if ticket.is_valid() {
                last_ticket = ticket;
            }
        }
    }

    if last_ticket.is_valid() {
        controller
            .wait_until_finish(last_ticket)
            .await
            .context("Stream stopped before playback finished")?;
    }

    Ok(())
}

/// Print events as JSON lines; keep stats flowing with a periodic pump
fn spawn_event_printer(controller: Arc<StreamController>) {
    let mut events = controller.subscribe_events();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Event printer skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(50));
        loop {
            interval.tick().await;
            if !controller.is_streaming() {
                break;
            }
            controller.pump_stats();
        }
    });
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
