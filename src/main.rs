//! gaze-recorder
//!
//! Records the synthetic world camera and a gaze stream into a numbered take
//! directory, then exits.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gaze_recorder::bus::{self, BroadcastBus, Notification, NotificationBus};
use gaze_recorder::capture::{CaptureSource, CycleEvents};
use gaze_recorder::config::Config;
use gaze_recorder::logging::{get_log_dir, init_logging};
use gaze_recorder::session::SessionController;
use gaze_recorder::sync::{create_engine_channels, EngineCommand, EngineStatus, RecorderEngine};

const DEFAULT_SECONDS: u64 = 5;

struct Args {
    session: Option<String>,
    seconds: u64,
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let Some(args) = parse_args(std::env::args().skip(1))? else {
        print_help();
        return Ok(());
    };

    let _log_guard = init_logging()?;
    info!("gaze-recorder starting, logs in {:?}", get_log_dir()?);

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path()?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config, args))?;

    info!("Shutdown complete");
    Ok(())
}

async fn run(config: Config, args: Args) -> Result<()> {
    let mut settings = config.recorder_settings()?;
    if let Some(name) = args.session {
        settings.session_name = name;
    }

    let capture = Arc::new(config.fake_capture());
    let source: Arc<dyn CaptureSource> = capture.clone();
    let bus = BroadcastBus::default();
    let controller = SessionController::new(settings, source, Arc::new(bus.clone()));

    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();
    let mut engine = RecorderEngine::new(controller, cmd_rx, bus.subscribe(), status_tx);
    let engine_handle = tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            error!("Recorder engine error: {}", e);
        }
    });

    tokio::spawn(report_status(status_rx));

    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = stop_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    bus.notify_all(Notification::new(bus::SHOULD_START));

    let frame_interval = Duration::from_secs_f64(1.0 / capture.frame_rate() as f64);
    let mut ticker = tokio::time::interval(frame_interval);
    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = match capture.grab() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to grab frame: {}", e);
                        continue;
                    }
                };
                let t = frame.timestamp;
                let gaze = json!({
                    "timestamp": t,
                    "norm_pos": [0.5 + 0.25 * t.sin(), 0.5 + 0.25 * t.cos()],
                    "confidence": 1.0,
                });
                let events = CycleEvents::new()
                    .with_frame(frame)
                    .with_batch("gaze_positions", vec![gaze]);
                if cmd_tx.send(EngineCommand::Cycle(events)).await.is_err() {
                    break;
                }
            }
            _ = &mut deadline => {
                info!("Recorded for {} seconds", args.seconds);
                break;
            }
            _ = stop_rx.recv() => break,
        }
    }

    let _ = cmd_tx.send(EngineCommand::Shutdown).await;
    engine_handle.await.context("Recorder engine task failed")?;
    Ok(())
}

/// Log status changes, not every cycle. Returns the number of saved takes.
async fn report_status(mut status_rx: broadcast::Receiver<EngineStatus>) -> usize {
    let mut recording = false;
    let mut saved = 0;
    loop {
        let status = match status_rx.recv().await {
            Ok(status) => status,
            Err(RecvError::Lagged(skipped)) => {
                debug!("Status reporter skipped {} updates", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match status {
            EngineStatus::Recording { rec_path, .. } if !recording => {
                recording = true;
                info!("Recording to {:?}", rec_path);
            }
            EngineStatus::Saved {
                rec_path,
                frame_count,
                warnings,
            } => {
                recording = false;
                saved += 1;
                info!("Saved {} frames to {:?} ({} warnings)", frame_count, rec_path, warnings);
            }
            EngineStatus::Error(message) => warn!("Recorder error: {}", message),
            _ => {}
        }
    }
    saved
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Option<Args>> {
    let mut args = Args {
        session: None,
        seconds: DEFAULT_SECONDS,
        config: None,
    };

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--session" => args.session = Some(argv.next().context("--session needs a name")?),
            "--seconds" => {
                let value = argv.next().context("--seconds needs a number")?;
                args.seconds = value
                    .parse()
                    .with_context(|| format!("Invalid --seconds value: {:?}", value))?;
            }
            "--config" => {
                args.config = Some(PathBuf::from(argv.next().context("--config needs a path")?));
            }
            other => bail!("Unknown argument: {:?} (see --help)", other),
        }
    }

    Ok(Some(args))
}

fn print_help() {
    println!("gaze-recorder - Record world video and gaze data");
    println!();
    println!("USAGE:");
    println!("    gaze-recorder [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help          Print this help message");
    println!("    --session NAME      Session label (may contain '/' for subfolders)");
    println!("    --seconds N         Stop after N seconds (default {})", DEFAULT_SECONDS);
    println!("    --config PATH       Use this config file instead of the default");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                 Set log level (e.g., debug, info, warn)");
    println!("    GAZE_RECORDER_LOG_PATH   Override the log directory");
}
