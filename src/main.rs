// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use futures::StreamExt;
use genmai_capture::app::{
    CaptureStateMachine, Coordinator, Mode, RunSummary,
    frame_processor::{FrameProcessor, HaarCascade},
};
use genmai_capture::backends::buttons::ButtonSource;
use genmai_capture::backends::camera::{Camera, V4l2Camera, v4l2_controls};
use genmai_capture::config::Config;
use genmai_capture::errors::AppResult;
use genmai_capture::pipelines::photo::JpegFileSink;
use genmai_capture::storage;
use genmai_capture::terminal::TerminalSurface;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

mod cli;

#[derive(Parser)]
#[command(name = "genmai-capture")]
#[command(about = "Still-capture station: live preview with face markers and metadata-named saves")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Configuration file (default: ~/.config/genmai-capture/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Camera video node, overrides the configuration
    #[arg(long, global = true)]
    device: Option<String>,

    /// Directory saved pictures are written to, overrides the configuration
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Face cascade XML, overrides the configuration
    #[arg(long, global = true)]
    cascade: Option<PathBuf>,

    /// Log at info level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview, detect faces and save pictures (default)
    Capture,

    /// Camera test: preview with face markers, no saving
    Preview,

    /// List cameras and input devices
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("genmai-capture: failed to set up logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exiting with error");
            eprintln!("genmai-capture: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=genmai_capture=trace
    let default_level = if verbose { "info" } else { "warn" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true);

    // The terminal surface owns stdout
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.camera_device = device;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(cascade) = cli.cascade {
        config.cascade_path = cascade;
    }

    let mode = match cli.command {
        Some(Commands::List) => return cli::list_devices(&config),
        Some(Commands::Preview) => Mode::Preview,
        Some(Commands::Capture) | None => Mode::Capture,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(run_station(config, mode))?;

    info!(saves = summary.saves, frames = summary.frames, "Station stopped");
    Ok(())
}

/// One-time setup, then the preview loop until exit
async fn run_station(config: Config, mode: Mode) -> AppResult<RunSummary> {
    info!(version = env!("GIT_VERSION"), ?mode, "Starting capture station");

    if mode == Mode::Capture
        && let Err(e) = storage::check_output_dir(&config.output_dir)
    {
        warn!(error = %e, "Output directory unavailable, saves will fail");
    }

    let cascade = HaarCascade::load(&config.cascade_path)?;

    let buttons = match ButtonSource::open(&config.button_device_name, config.button_map())
        .and_then(ButtonSource::into_events)
    {
        Ok(events) => Some(events.boxed()),
        Err(e) if config.require_buttons => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "Button panel unavailable, continuing without hardware buttons");
            None
        }
    };

    if config.enable_wdr
        && let Err(e) = v4l2_controls::enable_wide_dynamic_range(&config.sensor_subdevice)
    {
        warn!(error = %e, "Could not enable wide dynamic range");
    }

    let mut camera = V4l2Camera::open(&config.camera_device)?;
    camera.configure(config.capture_resolution, config.pixel_format)?;
    camera.start()?;
    if let Err(e) = camera.set_controls(&config.camera_controls) {
        warn!(error = %e, "Could not apply autofocus controls");
    }

    let processor = FrameProcessor::new(cascade, config.detection)
        .with_rotation(config.rotation)
        .with_display_size(config.display_resolution);

    let capture = CaptureStateMachine::new(
        JpegFileSink::new(config.jpeg_quality),
        config.output_dir.clone(),
        config.sample_kinds.clone(),
        config.initial_metadata.picture_counter,
    );

    let title = match mode {
        Mode::Capture => "Genmai Capture",
        Mode::Preview => "Camera Test",
    };
    let form = config.initial_form(chrono::Local::now().date_naive());
    let ui = TerminalSurface::open(
        form,
        config.sample_kinds.clone(),
        mode == Mode::Capture,
        title,
    )?;

    let mut coordinator = Coordinator::new(camera, ui, processor, capture)
        .with_mode(mode)
        .with_poll_interval(config.poll_interval());
    if let Some(events) = buttons {
        coordinator = coordinator.with_buttons(events);
    }

    coordinator.run().await
}
