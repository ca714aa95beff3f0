use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub const STAGE_TRACK_UPDATE: &str = "track_update";
pub const STAGE_DETECT: &str = "detect";
pub const STAGE_EMBED: &str = "embed";

pub const COUNT_FRAMES: &str = "frames";
pub const COUNT_FRAMES_SUPERSEDED: &str = "frames_superseded";
pub const COUNT_TRACKS_CREATED: &str = "tracks_created";
pub const COUNT_TRACKS_PRUNED: &str = "tracks_pruned";
pub const COUNT_DETECTOR_FAILURES: &str = "detector_failures";
pub const COUNT_RECOGNITIONS: &str = "recognitions";
pub const COUNT_RECOGNITION_FAILURES: &str = "recognition_failures";

#[derive(Default)]
struct StatsData {
    timings: HashMap<String, Vec<f64>>,
    counters: HashMap<String, u64>,
}

/// Per-stage timings and event counters shared by the engine's threads.
///
/// Every recording call takes a short internal lock; nothing else is held
/// while it is taken.
pub struct EngineStats {
    data: Mutex<StatsData>,
    start_time: Instant,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(StatsData::default()),
            start_time: Instant::now(),
        }
    }

    /// Record how long a named stage took once.
    pub fn timing(&self, stage: &str, duration_ms: f64) {
        self.lock()
            .timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    pub fn count(&self, name: &str, n: u64) {
        *self.lock().counters.entry(name.to_string()).or_default() += n;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    pub fn timings_for(&self, stage: &str) -> Option<Vec<f64>> {
        self.lock().timings.get(stage).cloned()
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        let data = self.lock();
        if data.timings.is_empty() && data.counters.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = Vec::new();
        lines.push(format!(
            "Engine summary ({:.1}s running):",
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = data.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &data.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({} calls)",
                durations.len()
            ));
        }

        let mut names: Vec<_> = data.counters.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: {}", data.counters[name]));
        }

        let frames = data.counters.get(COUNT_FRAMES).copied().unwrap_or(0);
        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    fn lock(&self) -> MutexGuard<'_, StatsData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}
