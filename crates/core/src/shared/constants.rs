use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Tracks whose region tracker reports a quality below this are dropped.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 7.0;

/// Horizontal margin added to each side of a detection before tracking it.
pub const DEFAULT_TRACK_PAD_X: i32 = 10;

/// Vertical margin added above and below a detection before tracking it.
pub const DEFAULT_TRACK_PAD_Y: i32 = 20;

/// Minimum spacing between two full-frame detection passes.
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(500);

pub const DEFAULT_RECOGNITION_WORKERS: usize = 3;

/// Euclidean acceptance radius for 128-d face descriptors.
pub const DEFAULT_MAX_IDENTITY_DISTANCE: f32 = 0.6;

/// Euclidean acceptance radius for L2-normalized ArcFace embeddings
/// (cosine similarity of roughly 0.4).
pub const ARCFACE_MAX_IDENTITY_DISTANCE: f32 = 1.1;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
