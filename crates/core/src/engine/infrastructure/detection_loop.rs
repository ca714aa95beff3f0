use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::detection::domain::face_detector::FaceDetector;
use crate::engine::engine_stats::{
    EngineStats, COUNT_DETECTOR_FAILURES, COUNT_TRACKS_CREATED, STAGE_DETECT,
};
use crate::engine::mailbox::Mailbox;
use crate::engine::next_track_notifier::NextTrackNotifier;
use crate::shared::tracking_error::TrackingError;
use crate::tracking::domain::track_registry::{Association, SharedTrackRegistry};

const THREAD_NAME: &str = "detection";

/// One detection pass: drain the mailbox, detect, reconcile with the
/// registry, announce new tracks.
pub struct DetectionCycle {
    detector: Box<dyn FaceDetector>,
    mailbox: Arc<Mailbox>,
    registry: Arc<SharedTrackRegistry>,
    notifier: Arc<NextTrackNotifier>,
    stats: Arc<EngineStats>,
}

impl DetectionCycle {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        mailbox: Arc<Mailbox>,
        registry: Arc<SharedTrackRegistry>,
        notifier: Arc<NextTrackNotifier>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            detector,
            mailbox,
            registry,
            notifier,
            stats,
        }
    }

    /// Returns false when the mailbox was empty.
    pub fn run_once(&mut self) -> bool {
        let Some(frame) = self.mailbox.take() else {
            return false;
        };

        let t0 = Instant::now();
        let detections = match self.detector.detect(&frame) {
            Ok(regions) => regions,
            Err(e) => {
                // The frame counts as having no detections.
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                self.stats.count(COUNT_DETECTOR_FAILURES, 1);
                return true;
            }
        };
        self.stats
            .timing(STAGE_DETECT, t0.elapsed().as_secs_f64() * 1000.0);
        log::debug!(
            "Frame {}: {} detection(s)",
            frame.index(),
            detections.len()
        );

        let created: Vec<_> = {
            let mut registry = self.registry.write();
            detections
                .into_iter()
                .filter_map(|detection| match registry.match_or_create(detection, &frame) {
                    Ok(Association::Created(track)) => Some(track),
                    Ok(Association::Matched(_)) => None,
                    Err(e) => {
                        log::warn!("Could not start tracking {detection:?}: {e}");
                        None
                    }
                })
                .collect()
        };

        // Registry lock is released before waking waiters.
        for track in created {
            log::info!("New track {} at {:?}", track.id, track.region);
            self.stats.count(COUNT_TRACKS_CREATED, 1);
            let woken = self.notifier.broadcast(track);
            if woken > 0 {
                log::debug!("Track {} delivered to {woken} waiter(s)", track.id);
            }
        }
        true
    }
}

enum LoopState {
    Stopped(Option<DetectionCycle>),
    Running {
        stop_tx: Sender<()>,
        handle: JoinHandle<Option<DetectionCycle>>,
    },
}

/// The background detection worker.
///
/// `stop` blocks until the thread has exited, so no mailbox read happens
/// after it returns. The detector travels back through the join handle and
/// the loop can be started again.
pub struct DetectionLoop {
    state: LoopState,
    interval: Duration,
}

impl DetectionLoop {
    pub fn new(cycle: DetectionCycle, interval: Duration) -> Self {
        Self {
            state: LoopState::Stopped(Some(cycle)),
            interval,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, LoopState::Running { .. })
    }

    pub fn start(&mut self) -> Result<(), TrackingError> {
        self.launch(thread::Builder::new().name(THREAD_NAME.into()))
    }

    fn launch(&mut self, builder: thread::Builder) -> Result<(), TrackingError> {
        let cycle = match &mut self.state {
            LoopState::Running { .. } => {
                return Err(TrackingError::LifecycleMisuse { operation: "start" })
            }
            // Only empty after an earlier run panicked.
            LoopState::Stopped(cycle) => cycle
                .take()
                .ok_or(TrackingError::WorkerPanicked(THREAD_NAME))?,
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        // The cycle is handed over only once the thread exists, so a failed
        // spawn leaves it here for the next start.
        let (cycle_tx, cycle_rx) = crossbeam_channel::bounded::<DetectionCycle>(1);
        let interval = self.interval;
        let spawned = builder.spawn(move || {
            let mut cycle = cycle_rx.recv().ok()?;
            loop {
                cycle.run_once();
                // Dropping the sender wakes the sleep early.
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("Detection loop exited");
            Some(cycle)
        });

        match spawned {
            Ok(handle) => {
                if let Err(unsent) = cycle_tx.send(cycle) {
                    self.state = LoopState::Stopped(Some(unsent.into_inner()));
                    return Err(TrackingError::WorkerPanicked(THREAD_NAME));
                }
                self.state = LoopState::Running { stop_tx, handle };
                log::debug!("Detection loop started ({:?} interval)", self.interval);
                Ok(())
            }
            Err(source) => {
                self.state = LoopState::Stopped(Some(cycle));
                Err(TrackingError::Spawn {
                    name: THREAD_NAME,
                    source,
                })
            }
        }
    }

    /// Signals the worker and joins it. No-op when already stopped.
    pub fn stop(&mut self) -> Result<(), TrackingError> {
        let state = std::mem::replace(&mut self.state, LoopState::Stopped(None));
        match state {
            LoopState::Stopped(cycle) => {
                self.state = LoopState::Stopped(cycle);
                Ok(())
            }
            LoopState::Running { stop_tx, handle } => {
                drop(stop_tx);
                match handle.join() {
                    Ok(cycle) => {
                        self.state = LoopState::Stopped(cycle);
                        Ok(())
                    }
                    Err(_) => Err(TrackingError::WorkerPanicked(THREAD_NAME)),
                }
            }
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Detection loop did not stop cleanly: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::region::Region;
    use crate::testing::{frame, DetectorScript, FakeTrackerFactory, ScriptedDetector};
    use crate::tracking::domain::track_registry::{RegistryConfig, TrackRegistry};

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        cycle: DetectionCycle,
        script: DetectorScript,
        mailbox: Arc<Mailbox>,
        registry: Arc<SharedTrackRegistry>,
        notifier: Arc<NextTrackNotifier>,
        stats: Arc<EngineStats>,
    }

    fn harness() -> Harness {
        let (detector, script) = ScriptedDetector::new();
        let mailbox = Arc::new(Mailbox::new());
        let registry = Arc::new(SharedTrackRegistry::new(TrackRegistry::new(
            Box::new(FakeTrackerFactory::new()),
            RegistryConfig::default(),
        )));
        let notifier = Arc::new(NextTrackNotifier::new());
        notifier.open();
        let stats = Arc::new(EngineStats::new());
        let cycle = DetectionCycle::new(
            Box::new(detector),
            Arc::clone(&mailbox),
            Arc::clone(&registry),
            Arc::clone(&notifier),
            Arc::clone(&stats),
        );
        Harness {
            cycle,
            script,
            mailbox,
            registry,
            notifier,
            stats,
        }
    }

    #[test]
    fn test_empty_mailbox_skips_detection() {
        let mut h = harness();
        assert!(!h.cycle.run_once());
        assert!(h.script.calls().try_recv().is_err());
    }

    #[test]
    fn test_only_latest_frame_is_detected() {
        let mut h = harness();
        h.mailbox.publish(frame(1));
        h.mailbox.publish(frame(2));

        assert!(h.cycle.run_once());
        assert!(!h.cycle.run_once());

        let seen: Vec<usize> = h.script.calls().try_iter().collect();
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn test_new_tracks_are_broadcast() {
        let mut h = harness();
        let waiter = h.notifier.register().unwrap();
        h.script.push(vec![Region::new(50, 50, 100, 100)]);
        h.mailbox.publish(frame(1));

        h.cycle.run_once();

        let track = waiter.wait_timeout(WAIT).unwrap();
        assert_eq!(track.id, 1);
        assert!(h.registry.read().contains(1));
        assert_eq!(h.stats.counter(COUNT_TRACKS_CREATED), 1);
    }

    #[test]
    fn test_matched_detection_is_not_broadcast() {
        let mut h = harness();
        h.script.push(vec![Region::new(50, 50, 100, 100)]);
        h.script.push(vec![Region::new(55, 55, 95, 95)]);
        h.mailbox.publish(frame(1));
        h.cycle.run_once();

        let waiter = h.notifier.register().unwrap();
        h.mailbox.publish(frame(2));
        h.cycle.run_once();

        assert!(waiter.try_take().is_none());
        assert_eq!(h.registry.read().len(), 1);
    }

    #[test]
    fn test_detector_error_is_absorbed() {
        let mut h = harness();
        h.script.push_error("model exploded");
        h.script.push(vec![Region::new(10, 10, 60, 60)]);

        h.mailbox.publish(frame(1));
        assert!(h.cycle.run_once());
        assert!(h.registry.read().is_empty());
        assert_eq!(h.stats.counter(COUNT_DETECTOR_FAILURES), 1);

        h.mailbox.publish(frame(2));
        h.cycle.run_once();
        assert_eq!(h.registry.read().len(), 1);
    }

    #[test]
    fn test_loop_processes_published_frames_and_stops() {
        let h = harness();
        let mut detection_loop = DetectionLoop::new(h.cycle, Duration::from_millis(5));
        detection_loop.start().unwrap();
        assert!(detection_loop.is_running());

        h.mailbox.publish(frame(7));
        assert_eq!(h.script.calls().recv_timeout(WAIT).unwrap(), 7);

        detection_loop.stop().unwrap();
        assert!(!detection_loop.is_running());

        // Nothing reads the mailbox once stop has returned.
        h.mailbox.publish(frame(8));
        std::thread::sleep(Duration::from_millis(30));
        assert!(h.script.calls().try_recv().is_err());
        assert!(h.mailbox.take().is_some());
    }

    #[test]
    fn test_loop_restarts_after_stop() {
        let h = harness();
        let mut detection_loop = DetectionLoop::new(h.cycle, Duration::from_millis(5));
        detection_loop.start().unwrap();
        detection_loop.stop().unwrap();
        detection_loop.start().unwrap();

        h.mailbox.publish(frame(3));
        assert_eq!(h.script.calls().recv_timeout(WAIT).unwrap(), 3);
        detection_loop.stop().unwrap();
    }

    #[test]
    fn test_double_start_is_misuse() {
        let h = harness();
        let mut detection_loop = DetectionLoop::new(h.cycle, Duration::from_millis(5));
        detection_loop.start().unwrap();
        assert!(matches!(
            detection_loop.start(),
            Err(TrackingError::LifecycleMisuse { operation: "start" })
        ));
        detection_loop.stop().unwrap();
        detection_loop.stop().unwrap();
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_failed_spawn_keeps_the_cycle_for_the_next_start() {
        let h = harness();
        let mut detection_loop = DetectionLoop::new(h.cycle, Duration::from_millis(5));

        // No address space can hold this stack, so thread creation fails.
        let oversized = thread::Builder::new().stack_size(usize::MAX / 4);
        assert!(matches!(
            detection_loop.launch(oversized),
            Err(TrackingError::Spawn { name: "detection", .. })
        ));
        assert!(!detection_loop.is_running());

        detection_loop.start().unwrap();
        h.mailbox.publish(frame(4));
        assert_eq!(h.script.calls().recv_timeout(WAIT).unwrap(), 4);
        detection_loop.stop().unwrap();
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let h = harness();
        let mut detection_loop = DetectionLoop::new(h.cycle, Duration::from_secs(60));
        detection_loop.start().unwrap();

        let t0 = Instant::now();
        detection_loop.stop().unwrap();
        assert!(t0.elapsed() < Duration::from_secs(5));
    }
}
