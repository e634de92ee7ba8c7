//! Tabletop tracker: replays a depth recording and prints finger events.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tabletop_tracker::{
    calibration::{CalibrationFile, CalibrationTransform, IdentityCalibration},
    config::Config,
    engine::HandTrackingEngine,
    fingertips::DetectorKind,
    sensor::{DepthSource, RecordedDepthStream},
    Error,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Raw depth recording to replay
    #[arg(short, long)]
    recording: String,

    /// Calibration file (YAML) mapping image to display coordinates
    #[arg(long)]
    calibration: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Fingertip detector (convexity_defects, hull_angle, thinning)
    #[arg(long)]
    detector: Option<String>,

    /// Filter type (none, double_exponential, kalman, optionally name:param)
    #[arg(short, long)]
    filter: Option<String>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path}");
            Config::from_file(path).with_context(|| format!("Failed to load config {path}"))?
        }
        None => Config::default(),
    };
    if let Some(detector) = &args.detector {
        config.fingertips.detector = detector.parse::<DetectorKind>()?;
    }
    if let Some(filter) = &args.filter {
        config.filter.kind = filter.clone();
    }
    Ok(config)
}

fn load_calibration(path: Option<&str>) -> Result<Box<dyn CalibrationTransform>> {
    match path {
        Some(path) => Ok(CalibrationFile::load(path)?.into_transform()),
        None => {
            warn!("No calibration file given, display coordinates equal image coordinates");
            Ok(Box::new(IdentityCalibration))
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Tabletop Tracker");

    let mut config = load_config(&args)?;
    let stream = RecordedDepthStream::open(&args.recording)
        .with_context(|| format!("Failed to open recording {}", args.recording))?;
    // The recording header is authoritative for the frame size
    config.sensor.width = stream.width();
    config.sensor.height = stream.height();
    if args.config.is_none() {
        config.sensor.cx = stream.width() as f32 / 2.0;
        config.sensor.cy = stream.height() as f32 / 2.0;
    }
    let calibration = load_calibration(args.calibration.as_deref())?;

    let mut engine = HandTrackingEngine::new(stream, Box::new(config.camera()), calibration, &config)?;

    let mut frames = 0u64;
    loop {
        if args.max_frames.is_some_and(|max| frames >= max) {
            info!("Reached {frames} frames, stopping");
            break;
        }
        let output = match engine.step() {
            Ok(output) => output,
            Err(Error::EndOfStream(last)) => {
                info!("Recording ended after frame {last}");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        frames += 1;

        for event in &output.events {
            println!("{event}");
        }
        for point in &output.pointed {
            println!("frame {}: pointing at ({:.1}, {:.1}, {:.1})", output.frame_id, point.x, point.y, point.z);
        }
    }

    Ok(())
}
