use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::engine::engine_stats::{
    EngineStats, COUNT_RECOGNITIONS, COUNT_RECOGNITION_FAILURES, STAGE_EMBED,
};
use crate::engine::pending::{pending, Completer, Pending};
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::identity_store::{IdentityStore, MatchPolicy};
use crate::recognition::domain::recognition_result::RecognitionResult;
use crate::shared::tracking_error::TrackingError;
use crate::tracking::domain::track::TrackId;
use crate::tracking::domain::track_registry::SharedTrackRegistry;

const THREAD_NAME: &str = "recognition";

/// Everything a recognition job reads. Shared by all workers.
pub struct RecognitionContext {
    pub registry: Arc<SharedTrackRegistry>,
    pub identities: Arc<IdentityStore>,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub stats: Arc<EngineStats>,
    pub policy: MatchPolicy,
    pub evict_on_failure: bool,
}

struct Job {
    track_id: TrackId,
    completer: Completer<RecognitionResult>,
}

/// Fixed-size pool of recognition workers fed by an unbounded queue.
///
/// Each job resolves its own handle; a failing job never affects another.
/// `shutdown` closes the queue and joins the workers once queued jobs are
/// done.
pub struct RecognitionPool {
    context: Arc<RecognitionContext>,
    size: usize,
    queue: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RecognitionPool {
    pub fn new(context: RecognitionContext, size: usize) -> Self {
        Self {
            context: Arc::new(context),
            size: size.max(1),
            queue: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) -> Result<(), TrackingError> {
        let mut queue = lock(&self.queue);
        if queue.is_some() {
            return Err(TrackingError::LifecycleMisuse { operation: "start" });
        }

        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let mut workers = lock(&self.workers);
        for i in 0..self.size {
            let rx = rx.clone();
            let context = Arc::clone(&self.context);
            let spawned = std::thread::Builder::new()
                .name(format!("{THREAD_NAME}-{i}"))
                .spawn(move || run_worker(&context, rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // Closing the queue lets the workers already started exit.
                    drop(tx);
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(TrackingError::Spawn {
                        name: THREAD_NAME,
                        source,
                    });
                }
            }
        }
        *queue = Some(tx);
        log::debug!("Recognition pool started with {} worker(s)", self.size);
        Ok(())
    }

    /// Queues a recognition of `track_id` and returns its handle.
    pub fn submit(&self, track_id: TrackId) -> Result<Pending<RecognitionResult>, TrackingError> {
        let queue = lock(&self.queue);
        let tx = queue.as_ref().ok_or(TrackingError::LifecycleMisuse {
            operation: "recognize",
        })?;
        let (completer, handle) = pending();
        tx.send(Job {
            track_id,
            completer,
        })
        .map_err(|_| TrackingError::WorkerPanicked(THREAD_NAME))?;
        Ok(handle)
    }

    /// Closes the queue and joins every worker. No-op when not started.
    pub fn shutdown(&self) -> Result<(), TrackingError> {
        drop(lock(&self.queue).take());
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        let mut panicked = false;
        for handle in workers {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(TrackingError::WorkerPanicked(THREAD_NAME));
        }
        Ok(())
    }
}

impl Drop for RecognitionPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Recognition pool did not shut down cleanly: {e}");
        }
    }
}

fn run_worker(context: &RecognitionContext, jobs: Receiver<Job>) {
    for job in jobs {
        let result = recognize(context, job.track_id);
        match &result {
            Ok(r) => {
                context.stats.count(COUNT_RECOGNITIONS, 1);
                log::debug!("Track {} recognized as {:?}", r.track_id, r.identity);
            }
            Err(e) => {
                context.stats.count(COUNT_RECOGNITION_FAILURES, 1);
                log::debug!("Recognition of track {} failed: {e}", job.track_id);
            }
        }
        job.completer.complete(result);
    }
}

/// Snapshot, embed, re-check, classify. At most one lock is held at a time.
fn recognize(
    context: &RecognitionContext,
    track_id: TrackId,
) -> Result<RecognitionResult, TrackingError> {
    let snapshot = context.registry.read().get(track_id)?;

    let t0 = Instant::now();
    let embedding = match context.embedder.embed(&snapshot.frame, &snapshot.region) {
        Ok(embedding) => embedding,
        Err(e) => {
            let message = e.to_string();
            log::warn!("Embedding track {track_id} failed: {message}");
            if context.evict_on_failure {
                let evicted = context.registry.write().remove(track_id);
                if evicted {
                    log::info!("Track {track_id} evicted after failed recognition");
                }
            }
            return Err(TrackingError::Embedder(message));
        }
    };
    context
        .stats
        .timing(STAGE_EMBED, t0.elapsed().as_secs_f64() * 1000.0);

    // The track may have been pruned while the embedder ran.
    if !context.registry.read().contains(track_id) {
        return Err(TrackingError::NotFound(track_id));
    }

    let matched = context.identities.classify(&embedding, &context.policy);
    Ok(RecognitionResult {
        track_id,
        region: snapshot.region,
        identity: matched.map(|m| m.id),
        distance: matched.map(|m| m.distance),
        embedding,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
