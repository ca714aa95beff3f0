//! Live set of tracked faces.
//!
//! The registry is the sole owner of region tracker instances. The engine
//! keeps it behind an `RwLock`: the per-frame update and detection
//! reconciliation take the write side, recognition snapshots take the read
//! side.
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::shared::constants::{
    DEFAULT_QUALITY_THRESHOLD, DEFAULT_TRACK_PAD_X, DEFAULT_TRACK_PAD_Y,
};
use crate::shared::frame::Frame;
use crate::shared::region::Region;
use crate::shared::tracking_error::TrackingError;

use super::region_tracker::{RegionTracker, RegionTrackerFactory};
use super::track::{TrackDescriptor, TrackId};

const FIRST_TRACK_ID: TrackId = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegistryConfig {
    /// Updates scoring below this remove the track.
    pub quality_threshold: f64,
    /// Margin added left and right of a detection before tracking starts.
    pub pad_x: i32,
    /// Margin added above and below a detection before tracking starts.
    pub pad_y: i32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            pad_x: DEFAULT_TRACK_PAD_X,
            pad_y: DEFAULT_TRACK_PAD_Y,
        }
    }
}

/// Consistent copy of a track's state, taken under the registry lock.
#[derive(Clone, Debug)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub region: Region,
    pub frame: Arc<Frame>,
}

/// Outcome of reconciling one detection against the live tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Association {
    /// The detection belongs to an existing track; nothing changed.
    Matched(TrackId),
    /// No track matched, so a new one was started.
    Created(TrackDescriptor),
}

impl Association {
    pub fn track_id(&self) -> TrackId {
        match self {
            Association::Matched(id) => *id,
            Association::Created(track) => track.id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Association::Created(_))
    }
}

/// Result of one tracking pass over every live track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Tracks still alive after the pass.
    pub tracked: usize,
    /// Tracks removed by this pass, in ascending id order.
    pub pruned: Vec<TrackId>,
}

struct TrackEntry {
    tracker: Box<dyn RegionTracker>,
    region: Region,
    last_frame: Arc<Frame>,
}

pub struct TrackRegistry {
    // Ordered so reconciliation visits tracks by ascending id.
    tracks: BTreeMap<TrackId, TrackEntry>,
    next_id: TrackId,
    factory: Box<dyn RegionTrackerFactory>,
    config: RegistryConfig,
}

impl TrackRegistry {
    pub fn new(factory: Box<dyn RegionTrackerFactory>, config: RegistryConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: FIRST_TRACK_ID,
            factory,
            config,
        }
    }

    /// Advances every track to `frame` and drops those whose quality falls
    /// below the threshold or whose tracker fails.
    pub fn update_all(&mut self, frame: &Arc<Frame>) -> UpdateReport {
        let threshold = self.config.quality_threshold;
        let mut pruned = Vec::new();

        for (&id, entry) in self.tracks.iter_mut() {
            match entry.tracker.update(frame) {
                // NaN scores fall through to pruning.
                Ok((region, quality)) if quality >= threshold => {
                    entry.region = region;
                    entry.last_frame = Arc::clone(frame);
                }
                Ok((_, quality)) => {
                    log::debug!("Track {id} lost (quality {quality:.2} < {threshold})");
                    pruned.push(id);
                }
                Err(e) => {
                    log::warn!("Track {id} tracker update failed: {e}");
                    pruned.push(id);
                }
            }
        }

        for id in &pruned {
            self.tracks.remove(id);
        }

        UpdateReport {
            tracked: self.tracks.len(),
            pruned,
        }
    }

    /// Returns the first live track (by id) that mutually contains
    /// `detection`.
    pub fn find_match(&self, detection: &Region) -> Option<TrackId> {
        self.tracks
            .iter()
            .find(|(_, entry)| entry.region.mutually_contains(detection))
            .map(|(&id, _)| id)
    }

    /// Associates a detection with an existing track, or starts a new track
    /// on the padded detection.
    pub fn match_or_create(
        &mut self,
        detection: Region,
        frame: &Arc<Frame>,
    ) -> Result<Association, TrackingError> {
        if let Some(id) = self.find_match(&detection) {
            return Ok(Association::Matched(id));
        }

        let region = detection
            .padded(self.config.pad_x, self.config.pad_y)
            .clamp_to(frame.width(), frame.height());
        let tracker = self
            .factory
            .start(frame, region)
            .map_err(|e| TrackingError::Tracker(e.to_string()))?;

        let id = self.next_id;
        self.next_id += 1;
        self.tracks.insert(
            id,
            TrackEntry {
                tracker,
                region,
                last_frame: Arc::clone(frame),
            },
        );
        log::debug!("Track {id} started at {region:?}");
        Ok(Association::Created(TrackDescriptor { id, region }))
    }

    pub fn get(&self, id: TrackId) -> Result<TrackSnapshot, TrackingError> {
        self.tracks
            .get(&id)
            .map(|entry| TrackSnapshot {
                id,
                region: entry.region,
                frame: Arc::clone(&entry.last_frame),
            })
            .ok_or(TrackingError::NotFound(id))
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Evicts a track. Returns whether it was live.
    pub fn remove(&mut self, id: TrackId) -> bool {
        self.tracks.remove(&id).is_some()
    }

    /// Descriptors of all live tracks in ascending id order.
    pub fn descriptors(&self) -> Vec<TrackDescriptor> {
        self.tracks
            .iter()
            .map(|(&id, entry)| TrackDescriptor {
                id,
                region: entry.region,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// The registry behind its reader/writer lock.
///
/// A panic inside a tracker while the write side is held leaves the map
/// itself intact, so poisoning is recovered rather than propagated.
pub struct SharedTrackRegistry {
    inner: RwLock<TrackRegistry>,
}

impl SharedTrackRegistry {
    pub fn new(registry: TrackRegistry) -> Self {
        Self {
            inner: RwLock::new(registry),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TrackRegistry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TrackRegistry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
