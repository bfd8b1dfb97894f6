//! multicam-recorder CLI
//!
//! Discover cameras, or record several of them at once into rotating
//! segment files until interrupted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multicam_recorder::capture::CameraHandle;
use multicam_recorder::commands::recording::{self, RecorderState, StartRecordingRequest};
use multicam_recorder::config::AppConfig;
use multicam_recorder::recorder::CameraStatus;
use multicam_recorder::utils::ErrorResponse;

#[derive(Parser)]
#[command(name = "multicam-recorder")]
#[command(author, version, about = "Record several cameras into rotating segments", long_about = None)]
struct Cli {
    /// Configuration file (JSON). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cameras that can be opened
    List {
        /// Highest device index to probe (exclusive)
        #[arg(long)]
        max_probe: Option<u32>,
    },

    /// Record the selected cameras until Ctrl-C or the duration elapses
    Record {
        /// Camera index to record (can be specified multiple times)
        #[arg(short, long = "camera", value_name = "INDEX", required = true)]
        cameras: Vec<u32>,

        /// Requested frame rate (0 = device default)
        #[arg(long)]
        fps: Option<u32>,

        /// Requested width (0 = device default)
        #[arg(long)]
        width: Option<u32>,

        /// Requested height (0 = device default)
        #[arg(long)]
        height: Option<u32>,

        /// Segment length in minutes
        #[arg(long)]
        segment_minutes: Option<u64>,

        /// Directory segments are written to
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,

        /// Write the latest preview of each camera here as `camera_N.jpg`
        #[arg(long, value_name = "DIR")]
        preview_dir: Option<PathBuf>,
    },
}

fn command_error(error: ErrorResponse) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", error.message, error.code)
}

fn segment_duration_from_minutes(minutes: u64) -> Result<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("Segment length of {minutes} minutes is out of range"))
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    multicam_recorder::init_tracing();
    let cli = Cli::parse();

    tracing::info!("Starting multicam-recorder v{}", env!("CARGO_PKG_VERSION"));
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List { max_probe } => {
            let state = RecorderState::from_config(config).map_err(command_error)?;
            let cameras = recording::discover_cameras(&state, max_probe)
                .await
                .map_err(command_error)?;
            if cameras.is_empty() {
                println!("No cameras found");
            }
            for camera in cameras {
                println!("{}\t{}", camera.index(), camera.label());
            }
        }
        Commands::Record {
            cameras,
            fps,
            width,
            height,
            segment_minutes,
            output,
            duration,
            preview_dir,
        } => {
            let settings = &mut config.recording;
            if let Some(fps) = fps {
                settings.target_fps = fps;
            }
            if let Some(width) = width {
                settings.target_width = width;
            }
            if let Some(height) = height {
                settings.target_height = height;
            }
            if let Some(minutes) = segment_minutes {
                settings.segment_duration = segment_duration_from_minutes(minutes)?;
            }
            if let Some(output) = output {
                settings.output_directory = output;
            }
            config.validate().context("Invalid recording options")?;

            let cameras = cameras.into_iter().map(CameraHandle::new).collect();
            record(config, cameras, duration.map(Duration::from_secs), preview_dir).await?;
        }
    }

    Ok(())
}

async fn record(
    config: AppConfig,
    cameras: Vec<CameraHandle>,
    duration: Option<Duration>,
    preview_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(dir) = &preview_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create preview directory {}", dir.display()))?;
    }

    let poll_interval = config.preview.min_interval.max(Duration::from_millis(100));
    let state = RecorderState::from_config(config).map_err(command_error)?;

    let report = recording::start_recording(
        &state,
        StartRecordingRequest {
            cameras,
            settings: None,
        },
    )
    .await
    .map_err(command_error)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(poll_interval);
    let mut last_statuses: BTreeMap<CameraHandle, CameraStatus> = BTreeMap::new();

    // Leaving the loop with an error still stops the session below
    let outcome: Result<()> = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping");
                break Ok(());
            }
            _ = &mut deadline => {
                tracing::info!("Duration elapsed, stopping");
                break Ok(());
            }
            _ = poll.tick() => {
                let slots = match recording::drain_preview(&state).await {
                    Ok(slots) => slots,
                    Err(e) => break Err(command_error(e)),
                };
                for slot in slots {
                    if last_statuses.insert(slot.camera, slot.status) != Some(slot.status) {
                        tracing::info!("{} is now {:?}", slot.camera, slot.status);
                    }
                    if let (Some(dir), Some(frame)) = (&preview_dir, &slot.frame) {
                        let path = dir.join(format!("{}.jpg", slot.camera.label()));
                        if let Err(e) = tokio::fs::write(&path, &frame.jpeg).await {
                            tracing::warn!("Failed to write preview {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }
    };

    let summary = recording::stop_recording(&state)
        .await
        .map_err(command_error)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    outcome
}
