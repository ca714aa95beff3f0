use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use facetrack_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facetrack_core::engine::engine_config::EngineConfig;
use facetrack_core::engine::tracking_engine::TrackingEngine;
use facetrack_core::recognition::domain::identity_store::{IdentityId, MatchPolicy};
use facetrack_core::recognition::infrastructure::arcface_embedder::ArcFaceEmbedder;
use facetrack_core::shared::constants::{
    ARCFACE_MAX_IDENTITY_DISTANCE, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, YOLO_MODEL_NAME,
    YOLO_MODEL_URL,
};
use facetrack_core::shared::model_resolver;
use facetrack_core::shared::tracking_error::TrackingError;
use facetrack_core::tracking::infrastructure::correlation_tracker::CorrelationTrackerFactory;
use facetrack_core::video::domain::frame_reader::FrameReader;
use facetrack_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;

/// Track faces across an image sequence and identify them on demand.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// Image file, or directory of images played back in name order.
    input: PathBuf,

    /// JSON file of known identities: [{"id": 1, "embedding": [...]}, ...].
    #[arg(long)]
    identities: Option<PathBuf>,

    /// Register unknown faces as new identities and save them to --identities.
    #[arg(long)]
    enroll: bool,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// Delay between noticing a new track and recognizing it.
    #[arg(long, default_value = "250")]
    recognize_delay_ms: u64,

    /// Delay between frames fed to the engine.
    #[arg(long, default_value = "33")]
    frame_interval_ms: u64,

    /// Minimum delay between two detection passes.
    #[arg(long, default_value = "500")]
    detect_interval_ms: u64,

    /// Number of recognition worker threads.
    #[arg(long, default_value = "3")]
    workers: usize,

    /// Tracks whose tracker quality drops below this are abandoned.
    #[arg(long, default_value = "7.0")]
    quality_threshold: f64,

    /// Horizontal padding added to detections before tracking.
    #[arg(long, default_value = "10")]
    pad_x: i32,

    /// Vertical padding added to detections before tracking.
    #[arg(long, default_value = "20")]
    pad_y: i32,

    /// Maximum embedding distance for an identity match.
    #[arg(long, default_value_t = ARCFACE_MAX_IDENTITY_DISTANCE)]
    max_distance: f32,

    /// Directory searched for models before downloading them.
    #[arg(long)]
    models: Option<PathBuf>,
}

/// One known face as stored in the identities file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct IdentityRecord {
    id: IdentityId,
    embedding: Vec<f32>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut reader = ImageSequenceReader::new();
    let metadata = reader.open(&cli.input)?;
    log::info!(
        "Input: {} frame(s) of {}x{}",
        metadata.total_frames,
        metadata.width,
        metadata.height
    );

    let mut known = match &cli.identities {
        Some(path) if path.exists() => load_identities(path)?,
        _ => Vec::new(),
    };
    log::info!("Loaded {} known identities", known.len());

    let engine = Arc::new(build_engine(&cli)?);
    for record in &known {
        engine.add_identity(record.id, record.embedding.clone());
    }
    engine.start()?;

    let recognize_delay = Duration::from_millis(cli.recognize_delay_ms);
    let first_free_id = known.iter().map(|r| r.id + 1).max().unwrap_or(1);
    let watcher = {
        let engine = Arc::clone(&engine);
        let enroll = cli.enroll;
        thread::Builder::new()
            .name("face-watcher".into())
            .spawn(move || watch_faces(&engine, recognize_delay, enroll, first_free_id))?
    };

    let frame_interval = Duration::from_millis(cli.frame_interval_ms);
    let total = metadata.total_frames;
    for (i, frame) in reader.frames().enumerate() {
        let report = engine.update(frame?)?;
        if !report.pruned.is_empty() {
            log::debug!("Frame {i}: lost tracks {:?}", report.pruned);
        }
        eprint!("\rFrame {}/{total} ({} tracked)", i + 1, report.tracked);
        thread::sleep(frame_interval);
    }
    eprintln!();
    reader.close();

    // Give the last detection pass and its recognition time to land.
    thread::sleep(Duration::from_millis(cli.detect_interval_ms) + recognize_delay * 2);
    engine.stop()?;

    let enrolled = watcher
        .join()
        .map_err(|_| "face watcher thread panicked")?;
    for track in engine.tracks() {
        log::info!("Still tracking {} at {:?}", track.id, track.region);
    }

    if cli.enroll && !enrolled.is_empty() {
        if let Some(path) = &cli.identities {
            known.extend(enrolled);
            save_identities(path, &known)?;
            log::info!("Saved {} identities to {}", known.len(), path.display());
        }
    }

    if let Some(summary) = engine.stats().summary_string() {
        log::info!("\n\n{summary}");
    }
    Ok(())
}

fn build_engine(cli: &Cli) -> Result<TrackingEngine, Box<dyn std::error::Error>> {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let detector_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        cli.models.as_deref(),
        Some(Box::new(|done: u64, total: u64| {
            download_progress("face detection", done, total)
        })),
    )?;
    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedder_path = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        cli.models.as_deref(),
        Some(Box::new(|done: u64, total: u64| {
            download_progress("face embedding", done, total)
        })),
    )?;

    let detector = OnnxYoloDetector::new(&detector_path, cli.confidence, (cores / 2).max(1))?;
    let embedder = ArcFaceEmbedder::new(&embedder_path, (cores / 2 / cli.workers.max(1)).max(1))?;

    let config = EngineConfig {
        quality_threshold: cli.quality_threshold,
        pad_x: cli.pad_x,
        pad_y: cli.pad_y,
        detection_interval: Duration::from_millis(cli.detect_interval_ms),
        recognition_workers: cli.workers,
        match_policy: MatchPolicy {
            max_distance: cli.max_distance,
        },
        ..EngineConfig::default()
    };
    Ok(TrackingEngine::new(
        Box::new(detector),
        Box::new(CorrelationTrackerFactory::new()),
        Arc::new(embedder),
        config,
    )?)
}

/// Waits for each new face, lets the tracker settle on it, then asks who it
/// is. Returns the identities enrolled along the way.
fn watch_faces(
    engine: &TrackingEngine,
    delay: Duration,
    enroll: bool,
    mut next_id: IdentityId,
) -> Vec<IdentityRecord> {
    let mut enrolled = Vec::new();
    loop {
        let track = match engine.next_track().and_then(|pending| pending.wait()) {
            Ok(track) => track,
            Err(TrackingError::Cancelled | TrackingError::LifecycleMisuse { .. }) => break,
            Err(e) => {
                log::warn!("Waiting for a new face failed: {e}");
                break;
            }
        };
        log::info!("New face: track {}", track.id);
        thread::sleep(delay);

        match engine.recognize(track.id).and_then(|pending| pending.wait()) {
            Ok(result) => match (result.identity, result.distance) {
                (Some(id), Some(distance)) => {
                    log::info!("Track {} is identity {id} (distance {distance:.3})", track.id);
                }
                _ if enroll => {
                    log::info!("Track {} is unknown; enrolled as identity {next_id}", track.id);
                    engine.add_identity(next_id, result.embedding.clone());
                    enrolled.push(IdentityRecord {
                        id: next_id,
                        embedding: result.embedding,
                    });
                    next_id += 1;
                }
                _ => log::info!("Track {} is unknown", track.id),
            },
            Err(e) if e.is_not_found() => {
                log::info!("Track {} was lost before it could be recognized", track.id);
            }
            Err(TrackingError::Cancelled | TrackingError::LifecycleMisuse { .. }) => break,
            Err(e) => log::warn!("Recognizing track {} failed: {e}", track.id),
        }
    }
    enrolled
}

fn load_identities(path: &Path) -> Result<Vec<IdentityRecord>, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let records: Vec<IdentityRecord> = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid identities file {}: {e}", path.display()))?;
    Ok(records)
}

fn save_identities(path: &Path, records: &[IdentityRecord]) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.workers == 0 {
        return Err("--workers must be at least 1".into());
    }
    if cli.pad_x < 0 || cli.pad_y < 0 {
        return Err(format!("Padding must be non-negative, got ({}, {})", cli.pad_x, cli.pad_y).into());
    }
    if !(cli.max_distance.is_finite() && cli.max_distance > 0.0) {
        return Err(format!("--max-distance must be positive, got {}", cli.max_distance).into());
    }
    if cli.enroll && cli.identities.is_none() {
        return Err("--enroll requires --identities to save new faces to".into());
    }
    if let Some(path) = &cli.identities {
        if !cli.enroll && !path.exists() {
            return Err(format!("Identities file not found: {}", path.display()).into());
        }
    }
    Ok(())
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
}
