//! In-process fakes for the engine's collaborators.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::face_detector::FaceDetector;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::tracking::domain::region_tracker::{RegionTracker, RegionTrackerFactory};

pub const FRAME_WIDTH: u32 = 320;
pub const FRAME_HEIGHT: u32 = 240;

pub fn frame(index: usize) -> Arc<Frame> {
    Arc::new(raw_frame(index))
}

pub fn raw_frame(index: usize) -> Frame {
    let len = (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize;
    Frame::new(vec![0u8; len], FRAME_WIDTH, FRAME_HEIGHT, 3, index)
}

// ── Region tracker ───────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct TrackerScript {
    /// `None` makes updates fail.
    quality: Option<f64>,
    motion: (i32, i32),
}

#[derive(Default)]
struct FactoryState {
    started: Vec<Region>,
    scripts: Vec<Arc<Mutex<TrackerScript>>>,
    fail_starts: bool,
}

/// Tracker factory whose trackers report a scripted quality and motion.
///
/// Trackers are addressed by start order (0 = first started).
#[derive(Clone, Default)]
pub struct FakeTrackerFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl FakeTrackerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial regions of every tracker started so far.
    pub fn started(&self) -> Vec<Region> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn set_quality(&self, nth: usize, quality: f64) {
        self.script(nth).lock().unwrap().quality = Some(quality);
    }

    pub fn set_failing(&self, nth: usize) {
        self.script(nth).lock().unwrap().quality = None;
    }

    pub fn set_motion(&self, nth: usize, motion: (i32, i32)) {
        self.script(nth).lock().unwrap().motion = motion;
    }

    pub fn fail_starts(&self, fail: bool) {
        self.state.lock().unwrap().fail_starts = fail;
    }

    fn script(&self, nth: usize) -> Arc<Mutex<TrackerScript>> {
        Arc::clone(&self.state.lock().unwrap().scripts[nth])
    }
}

impl RegionTrackerFactory for FakeTrackerFactory {
    fn start(
        &self,
        _frame: &Frame,
        region: Region,
    ) -> Result<Box<dyn RegionTracker>, Box<dyn std::error::Error>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_starts {
            return Err("tracker start refused".into());
        }
        let script = Arc::new(Mutex::new(TrackerScript {
            quality: Some(10.0),
            motion: (0, 0),
        }));
        state.started.push(region);
        state.scripts.push(Arc::clone(&script));
        Ok(Box::new(FakeTracker { region, script }))
    }
}

struct FakeTracker {
    region: Region,
    script: Arc<Mutex<TrackerScript>>,
}

impl RegionTracker for FakeTracker {
    fn update(&mut self, _frame: &Frame) -> Result<(Region, f64), Box<dyn std::error::Error>> {
        let script = *self.script.lock().unwrap();
        let quality = script.quality.ok_or("tracker lost its target")?;
        self.region = self.region.translated(script.motion.0, script.motion.1);
        Ok((self.region, quality))
    }
}

// ── Detector ─────────────────────────────────────────────────────────

enum DetectorStep {
    Regions(Vec<Region>),
    Fail(String),
    Panic,
}

/// Detector that replays scripted results and reports the index of every
/// frame it is given.
pub struct ScriptedDetector {
    script: Arc<Mutex<VecDeque<DetectorStep>>>,
    calls: Sender<usize>,
}

/// Test-side handle to a [`ScriptedDetector`].
#[derive(Clone)]
pub struct DetectorScript {
    script: Arc<Mutex<VecDeque<DetectorStep>>>,
    calls: Receiver<usize>,
}

impl ScriptedDetector {
    pub fn new() -> (Self, DetectorScript) {
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                script: Arc::clone(&script),
                calls: tx,
            },
            DetectorScript { script, calls: rx },
        )
    }
}

impl DetectorScript {
    /// Queues the result of the next unscripted detection pass.
    pub fn push(&self, regions: Vec<Region>) {
        self.script.lock().unwrap().push_back(DetectorStep::Regions(regions));
    }

    pub fn push_error(&self, message: &str) {
        self.script.lock().unwrap().push_back(DetectorStep::Fail(message.to_string()));
    }

    /// Makes the next detection pass panic, killing the detection thread.
    pub fn push_panic(&self) {
        self.script.lock().unwrap().push_back(DetectorStep::Panic);
    }

    /// Frame indices seen by the detector, in call order.
    pub fn calls(&self) -> &Receiver<usize> {
        &self.calls
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let next = self.script.lock().unwrap().pop_front();
        let _ = self.calls.send(frame.index());
        match next {
            Some(DetectorStep::Regions(regions)) => Ok(regions),
            Some(DetectorStep::Fail(message)) => Err(message.into()),
            Some(DetectorStep::Panic) => panic!("scripted detector panic"),
            None => Ok(Vec::new()),
        }
    }
}

// ── Embedder ─────────────────────────────────────────────────────────

/// Embedder returning a fixed vector, or failing.
///
/// A gated embedder signals `entered` when a call starts and blocks until
/// the test sends on `release`.
pub struct FakeEmbedder {
    result: Result<Vec<f32>, String>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

pub struct EmbedGate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl FakeEmbedder {
    pub fn returning(embedding: Vec<f32>) -> Self {
        Self {
            result: Ok(embedding),
            gate: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            gate: None,
        }
    }

    pub fn gated(embedding: Vec<f32>) -> (Self, EmbedGate) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        (
            Self {
                result: Ok(embedding),
                gate: Some((entered_tx, release_rx)),
            },
            EmbedGate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl FaceEmbedder for FakeEmbedder {
    fn embed(
        &self,
        _frame: &Frame,
        _region: &Region,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        if let Some((entered, release)) = &self.gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.result.clone().map_err(Into::into)
    }
}
