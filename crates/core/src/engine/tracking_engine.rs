//! The tracking engine: per-frame tracking on the caller's thread, rate
//! limited detection on a background thread, and on-demand recognition on
//! a worker pool.
//!
//! Each shared structure has its own guard (registry, identity store,
//! notifier, mailbox, stats) and no code path holds two of them at once.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::detection::domain::face_detector::FaceDetector;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::identity_store::{IdentityId, IdentityStore};
use crate::recognition::domain::recognition_result::RecognitionResult;
use crate::shared::frame::Frame;
use crate::shared::tracking_error::TrackingError;
use crate::tracking::domain::region_tracker::RegionTrackerFactory;
use crate::tracking::domain::track::{TrackDescriptor, TrackId};
use crate::tracking::domain::track_registry::{SharedTrackRegistry, TrackRegistry, UpdateReport};

use super::engine_config::EngineConfig;
use super::engine_stats::{
    EngineStats, COUNT_FRAMES, COUNT_FRAMES_SUPERSEDED, COUNT_TRACKS_PRUNED, STAGE_TRACK_UPDATE,
};
use super::infrastructure::detection_loop::{DetectionCycle, DetectionLoop};
use super::infrastructure::recognition_pool::{RecognitionContext, RecognitionPool};
use super::mailbox::Mailbox;
use super::next_track_notifier::NextTrackNotifier;
use super::pending::Pending;

pub struct TrackingEngine {
    config: EngineConfig,
    registry: Arc<SharedTrackRegistry>,
    identities: Arc<IdentityStore>,
    mailbox: Arc<Mailbox>,
    notifier: Arc<NextTrackNotifier>,
    stats: Arc<EngineStats>,
    /// Also serializes `start` and `stop`.
    detection: Mutex<DetectionLoop>,
    recognition: RecognitionPool,
    running: AtomicBool,
}

impl TrackingEngine {
    /// Builds a stopped engine around the given collaborators.
    pub fn new(
        detector: Box<dyn FaceDetector>,
        tracker_factory: Box<dyn RegionTrackerFactory>,
        embedder: Arc<dyn FaceEmbedder>,
        config: EngineConfig,
    ) -> Result<Self, TrackingError> {
        config.validate()?;

        let registry = Arc::new(SharedTrackRegistry::new(TrackRegistry::new(
            tracker_factory,
            config.registry_config(),
        )));
        let identities = Arc::new(IdentityStore::new());
        let mailbox = Arc::new(Mailbox::new());
        let notifier = Arc::new(NextTrackNotifier::new());
        let stats = Arc::new(EngineStats::new());

        let cycle = DetectionCycle::new(
            detector,
            Arc::clone(&mailbox),
            Arc::clone(&registry),
            Arc::clone(&notifier),
            Arc::clone(&stats),
        );
        let recognition = RecognitionPool::new(
            RecognitionContext {
                registry: Arc::clone(&registry),
                identities: Arc::clone(&identities),
                embedder,
                stats: Arc::clone(&stats),
                policy: config.match_policy,
                evict_on_failure: config.evict_on_recognition_failure,
            },
            config.recognition_workers,
        );

        Ok(Self {
            detection: Mutex::new(DetectionLoop::new(cycle, config.detection_interval)),
            config,
            registry,
            identities,
            mailbox,
            notifier,
            stats,
            recognition,
            running: AtomicBool::new(false),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the detection loop and the recognition workers. Any frame left
    /// in the mailbox by a previous run is discarded.
    pub fn start(&self) -> Result<(), TrackingError> {
        let mut detection = lock(&self.detection);
        if self.is_running() {
            return Err(TrackingError::LifecycleMisuse { operation: "start" });
        }

        self.mailbox.clear();
        self.notifier.open();
        if let Err(e) = self.recognition.start() {
            self.notifier.close();
            return Err(e);
        }
        if let Err(e) = detection.start() {
            self.notifier.close();
            if let Err(shutdown) = self.recognition.shutdown() {
                log::warn!("Recognition workers did not stop cleanly: {shutdown}");
            }
            return Err(e);
        }

        self.running.store(true, Ordering::Release);
        log::info!(
            "Tracking engine started ({} recognition worker(s), {:?} detection interval)",
            self.config.recognition_workers,
            self.config.detection_interval
        );
        Ok(())
    }

    /// Joins the detection loop, cancels outstanding `next_track` handles
    /// and lets queued recognitions finish. No-op when already stopped.
    pub fn stop(&self) -> Result<(), TrackingError> {
        let mut detection = lock(&self.detection);
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let detection_result = detection.stop();
        self.notifier.close();
        let recognition_result = self.recognition.shutdown();
        self.mailbox.clear();
        log::info!("Tracking engine stopped");

        detection_result.and(recognition_result)
    }

    /// Advances every track to `frame`, pruning lost ones, then hands the
    /// frame to the detection loop.
    pub fn update(&self, frame: Frame) -> Result<UpdateReport, TrackingError> {
        self.ensure_running("update")?;
        let frame = Arc::new(frame);

        let t0 = Instant::now();
        let report = self.registry.write().update_all(&frame);
        self.stats
            .timing(STAGE_TRACK_UPDATE, t0.elapsed().as_secs_f64() * 1000.0);
        self.stats.count(COUNT_FRAMES, 1);
        if !report.pruned.is_empty() {
            log::info!("Tracks lost: {:?}", report.pruned);
            self.stats
                .count(COUNT_TRACKS_PRUNED, report.pruned.len() as u64);
        }

        if self.mailbox.publish(frame) {
            self.stats.count(COUNT_FRAMES_SUPERSEDED, 1);
        }
        Ok(report)
    }

    /// Resolves with the next track the detection loop creates.
    pub fn next_track(&self) -> Result<Pending<TrackDescriptor>, TrackingError> {
        self.notifier.register()
    }

    /// Queues recognition of a live track.
    pub fn recognize(&self, track_id: TrackId) -> Result<Pending<RecognitionResult>, TrackingError> {
        self.recognition.submit(track_id)
    }

    /// Adds or replaces a known identity. Allowed in any lifecycle state.
    pub fn add_identity(&self, id: IdentityId, embedding: Vec<f32>) {
        self.identities.add(id, embedding);
    }

    pub fn remove_identity(&self, id: IdentityId) -> bool {
        self.identities.remove(id)
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// Live tracks in ascending id order.
    pub fn tracks(&self) -> Vec<TrackDescriptor> {
        self.registry.read().descriptors()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    fn ensure_running(&self, operation: &'static str) -> Result<(), TrackingError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(TrackingError::LifecycleMisuse { operation })
        }
    }
}

impl Drop for TrackingEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Tracking engine did not stop cleanly: {e}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
