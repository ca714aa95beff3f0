//! Template tracker based on normalized cross-correlation.
//!
//! The tracked patch is sampled on a coarse grid of grayscale values so
//! the template is never larger than `MAX_TEMPLATE_SIDE` cells per side.
//! Each update scans a window of offsets around the previous position and
//! moves to the correlation peak.
//!
//! Quality is the peak-to-sidelobe ratio (PSR) of the correlation surface
//! relative to the PSR of the template against its own start frame, scaled
//! so an unchanged target scores `REFERENCE_QUALITY`. Smooth targets such as
//! faces have a broad autocorrelation peak and a low absolute PSR, so the
//! absolute value alone says little about whether the target is still there.
//! The peak correlation also scales the score, which drops a target replaced
//! by unrelated content. A featureless patch scores zero.
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::tracking::domain::region_tracker::{RegionTracker, RegionTrackerFactory};

const MAX_TEMPLATE_SIDE: i32 = 32;

/// Smallest search radius, in cells. Leaves sidelobe samples outside the
/// excluded window around the peak.
const MIN_SEARCH_RADIUS: i32 = 4;

/// Half-width of the window around the peak left out of the sidelobe.
const PEAK_EXCLUSION: i32 = 2;

/// Weight of the newest patch when refreshing the template.
const LEARNING_RATE: f32 = 0.125;

/// Quality of a target whose correlation surface matches the start frame's.
const REFERENCE_QUALITY: f32 = 10.0;

/// Floor for the start-frame PSR, so a weakly textured start cannot inflate
/// later scores.
const MIN_BASELINE_PSR: f32 = 2.0;

const EPSILON: f32 = 1e-6;

#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationTrackerFactory;

impl CorrelationTrackerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl RegionTrackerFactory for CorrelationTrackerFactory {
    fn start(
        &self,
        frame: &Frame,
        region: Region,
    ) -> Result<Box<dyn RegionTracker>, Box<dyn std::error::Error>> {
        Ok(Box::new(CorrelationTracker::new(frame, region)?))
    }
}

pub struct CorrelationTracker {
    region: Region,
    /// Pixels per template cell.
    cell: i32,
    cols: i32,
    rows: i32,
    template: Vec<f32>,
    search_radius: i32,
    /// PSR of the template against its own start frame.
    baseline_psr: f32,
}

/// Correlation surface over the search window, laid out row by row.
struct Scan {
    surface: Vec<f32>,
    peak_dx: i32,
    peak_dy: i32,
    peak: f32,
    patch: Vec<f32>,
}

impl CorrelationTracker {
    pub fn new(frame: &Frame, region: Region) -> Result<Self, Box<dyn std::error::Error>> {
        if region.is_empty() {
            return Err(format!("cannot track empty region {region:?}").into());
        }
        let longest = region.width().max(region.height());
        let cell = (longest + MAX_TEMPLATE_SIDE - 1) / MAX_TEMPLATE_SIDE;
        let cols = (region.width() + cell - 1) / cell;
        let rows = (region.height() + cell - 1) / cell;
        let search_radius = (cols.max(rows) / 4).max(MIN_SEARCH_RADIUS);

        let mut tracker = Self {
            region,
            cell,
            cols,
            rows,
            template: Vec::new(),
            search_radius,
            baseline_psr: 0.0,
        };
        tracker.template = tracker.sample(frame, region.left, region.top);
        let scan = tracker.scan(frame);
        tracker.baseline_psr = psr(&scan.surface, search_radius, scan.peak_dx, scan.peak_dy);
        Ok(tracker)
    }

    /// Grayscale cells of the patch whose top-left corner is `(left, top)`.
    fn sample(&self, frame: &Frame, left: i32, top: i32) -> Vec<f32> {
        let half = self.cell / 2;
        let mut cells = Vec::with_capacity((self.cols * self.rows) as usize);
        for row in 0..self.rows {
            for col in 0..self.cols {
                cells.push(frame.luma(left + col * self.cell + half, top + row * self.cell + half));
            }
        }
        cells
    }

    /// Correlates the template with the patch at every offset of the search
    /// window.
    fn scan(&self, frame: &Frame) -> Scan {
        let r = self.search_radius;
        let side = (2 * r + 1) as usize;
        let mut best = Scan {
            surface: Vec::with_capacity(side * side),
            peak_dx: 0,
            peak_dy: 0,
            peak: f32::NEG_INFINITY,
            patch: Vec::new(),
        };

        for dy in -r..=r {
            for dx in -r..=r {
                let patch = self.sample(
                    frame,
                    self.region.left + dx * self.cell,
                    self.region.top + dy * self.cell,
                );
                let score = ncc(&self.template, &patch);
                best.surface.push(score);
                if score > best.peak {
                    best.peak_dx = dx;
                    best.peak_dy = dy;
                    best.peak = score;
                    best.patch = patch;
                }
            }
        }
        best
    }

    fn quality(&self, scan: &Scan) -> f32 {
        let current = psr(&scan.surface, self.search_radius, scan.peak_dx, scan.peak_dy);
        REFERENCE_QUALITY * scan.peak.max(0.0) * current / self.baseline_psr.max(MIN_BASELINE_PSR)
    }
}

impl RegionTracker for CorrelationTracker {
    fn update(&mut self, frame: &Frame) -> Result<(Region, f64), Box<dyn std::error::Error>> {
        let scan = self.scan(frame);
        let quality = self.quality(&scan);

        self.region = self
            .region
            .translated(scan.peak_dx * self.cell, scan.peak_dy * self.cell);
        for (t, p) in self.template.iter_mut().zip(&scan.patch) {
            *t = (1.0 - LEARNING_RATE) * *t + LEARNING_RATE * p;
        }

        Ok((self.region, quality as f64))
    }
}

/// Zero-mean normalized cross-correlation in `[-1, 1]`. Flat patches score 0.
fn ncc(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len()) as f32;
    if n == 0.0 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let (mut cross, mut var_a, mut var_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        let da = x - mean_a;
        let db = y - mean_b;
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom < EPSILON {
        0.0
    } else {
        cross / denom
    }
}

/// Peak-to-sidelobe ratio of a `(2r+1)^2` surface laid out row by row.
fn psr(surface: &[f32], r: i32, peak_dx: i32, peak_dy: i32) -> f32 {
    let side = 2 * r + 1;
    let peak = surface[((peak_dy + r) * side + (peak_dx + r)) as usize];

    let sidelobe: Vec<f32> = surface
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let dx = *i as i32 % side - r;
            let dy = *i as i32 / side - r;
            (dx - peak_dx).abs() > PEAK_EXCLUSION || (dy - peak_dy).abs() > PEAK_EXCLUSION
        })
        .map(|(_, v)| *v)
        .collect();
    if sidelobe.is_empty() {
        return 0.0;
    }

    let n = sidelobe.len() as f32;
    let mean = sidelobe.iter().sum::<f32>() / n;
    let var = sidelobe.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let std = var.sqrt();
    if std < EPSILON {
        return 0.0;
    }
    (peak - mean) / std
}
