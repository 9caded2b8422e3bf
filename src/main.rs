//! Selfie Capture CLI
//!
//! Drives one capture session end to end against a simulated camera:
//! open, optionally switch, capture, save, close.

use clap::Parser;
use selfie_capture::{
    capture::{ImageFormat, StaticFrameSource},
    config::{FileConfig, OutputConfig, SessionConfig},
    device::{DeviceError, FacingMode, MockDevices},
    FileSink, Session, SessionMetrics, SessionState,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "selfie-capture", version, about = "Run a scripted camera capture session")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera to open (front or back)
    #[arg(long)]
    facing: Option<FacingMode>,

    /// Output format (jpeg or png)
    #[arg(long)]
    format: Option<ImageFormat>,

    /// Encoding quality in (0, 1]
    #[arg(long)]
    quality: Option<f32>,

    /// Directory to save the photo into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Close the session right after saving
    #[arg(long)]
    close_after_save: bool,

    /// Switch to the other camera before capturing
    #[arg(long)]
    switch: bool,

    /// Simulate the user declining the permission prompt
    #[arg(long)]
    deny_permission: bool,

    /// Print session metrics on exit
    #[arg(long)]
    metrics: bool,

    /// Pause between steps, in milliseconds
    #[arg(long, default_value_t = 0)]
    step_delay_ms: u64,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Selfie Capture v{}", selfie_capture::VERSION);

    let (mut config, mut output) = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(file) => (file.session, file.output),
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => (SessionConfig::default(), OutputConfig::default()),
    };
    apply_overrides(&args, &mut config, &mut output);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(&args, config, output, &interrupted)) {
        eprintln!("Capture session failed: {}", e);
        std::process::exit(1);
    }
}

fn apply_overrides(args: &Args, config: &mut SessionConfig, output: &mut OutputConfig) {
    if let Some(facing) = args.facing {
        config.default_facing = facing;
    }
    if let Some(format) = args.format {
        config.encoding.format = format;
    }
    if let Some(quality) = args.quality {
        config.encoding.quality = quality;
    }
    if args.close_after_save {
        config.close_after_save = true;
    }
    if let Some(dir) = &args.output {
        output.directory = dir.clone();
    }
    if args.metrics {
        output.metrics = true;
    }
}

async fn run(
    args: &Args,
    config: SessionConfig,
    output: OutputConfig,
    interrupted: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = SessionMetrics::new()?;
    let devices = MockDevices::new();
    if args.deny_permission {
        devices.fail_next(DeviceError::PermissionDenied(
            "user dismissed the prompt".into(),
        ));
    }

    let session = Session::with_metrics(devices, config, metrics.clone())?;
    if !session.is_supported() {
        eprintln!("Camera access is not supported on this platform");
        return Ok(());
    }

    let result = drive(&session, args, &output, interrupted).await;

    if output.metrics {
        print!("{}", metrics.encode()?);
    }
    result
}

async fn drive(
    session: &Session<MockDevices>,
    args: &Args,
    output: &OutputConfig,
    interrupted: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let step = Duration::from_millis(args.step_delay_ms);
    let facing = session.config().default_facing;

    if let Err(e) = session.open(facing).await {
        warn!("Could not open camera: {}", e);
        return Ok(());
    }
    if stop_requested(step, interrupted).await {
        info!("Interrupted, releasing camera");
        return Ok(());
    }

    if args.switch {
        if let Err(e) = session.switch(facing.opposite()).await {
            warn!("Camera switch failed: {}", e);
            return Ok(());
        }
        if stop_requested(step, interrupted).await {
            info!("Interrupted, releasing camera");
            return Ok(());
        }
    }

    let settings = session
        .stream_settings()
        .ok_or("camera stream missing after open")?;
    let video = StaticFrameSource::test_pattern(settings.width, settings.height);
    session.stream_ready();

    session.capture(&video)?;
    if let Some(image) = session.captured_image() {
        info!(
            "Captured {}x{} {} ({} bytes, mirrored: {})",
            image.width(),
            image.height(),
            image.format().extension(),
            image.bytes().len(),
            session.facing().mirrors_capture()
        );
    }
    if stop_requested(step, interrupted).await {
        info!("Interrupted, discarding photo");
        return Ok(());
    }

    let mut sink = FileSink::new(&output.directory);
    info!("Saving into {}", sink.directory().display());
    let saved = session.save(&mut sink)?;
    println!("Saved {} (blake3 {})", saved.location, saved.digest);

    if session.state() != SessionState::Idle {
        session.close()?;
    }
    Ok(())
}

async fn stop_requested(step: Duration, interrupted: &AtomicBool) -> bool {
    if !step.is_zero() {
        tokio::time::sleep(step).await;
    }
    interrupted.load(Ordering::SeqCst)
}
