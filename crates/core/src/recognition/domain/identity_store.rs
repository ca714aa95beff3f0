use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::shared::constants::DEFAULT_MAX_IDENTITY_DISTANCE;

/// Caller-chosen identity key.
pub type IdentityId = u64;

/// Nearest-neighbour acceptance rule for identity matching.
///
/// The distance is Euclidean. A probe matches the closest stored identity
/// when that distance is at most `max_distance`; ties go to the lower id.
/// Stored embeddings whose length differs from the probe never match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchPolicy {
    pub max_distance: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_IDENTITY_DISTANCE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdentityMatch {
    pub id: IdentityId,
    pub distance: f32,
}

/// In-memory table of known identities, maintained by the caller.
///
/// No deduplication or validation: adding an existing id replaces its
/// embedding.
#[derive(Default)]
pub struct IdentityStore {
    identities: Mutex<BTreeMap<IdentityId, Vec<f32>>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: IdentityId, embedding: Vec<f32>) {
        self.lock().insert(id, embedding);
    }

    /// Returns whether the id was present.
    pub fn remove(&self, id: IdentityId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    pub fn ids(&self) -> Vec<IdentityId> {
        self.lock().keys().copied().collect()
    }

    /// Finds the closest identity to `probe` accepted by `policy`.
    pub fn classify(&self, probe: &[f32], policy: &MatchPolicy) -> Option<IdentityMatch> {
        let identities = self.lock();
        let mut best: Option<IdentityMatch> = None;
        for (&id, stored) in identities.iter() {
            let Some(distance) = euclidean_distance(probe, stored) else {
                continue;
            };
            // Strict comparison keeps the lower id on ties.
            if distance <= policy.max_distance && best.map_or(true, |b| distance < b.distance) {
                best = Some(IdentityMatch { id, distance });
            }
        }
        best
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<IdentityId, Vec<f32>>> {
        self.identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// `None` when the vectors have different lengths.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        assert_relative_eq!(
            euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap(),
            5.0
        );
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        assert!(euclidean_distance(&[0.0], &[0.0, 1.0]).is_none());
    }

    #[test]
    fn test_add_and_remove() {
        let store = IdentityStore::new();
        store.add(42, vec![0.1, 0.2]);
        store.add(7, vec![0.3, 0.4]);
        assert_eq!(store.ids(), vec![7, 42]);

        assert!(store.remove(42));
        assert!(!store.remove(42));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_existing_id_replaces_embedding() {
        let store = IdentityStore::new();
        store.add(1, vec![0.0, 0.0]);
        store.add(1, vec![10.0, 10.0]);

        assert_eq!(store.len(), 1);
        let m = store
            .classify(&[10.0, 10.0], &MatchPolicy::default())
            .unwrap();
        assert_relative_eq!(m.distance, 0.0);
    }

    #[test]
    fn test_classify_picks_nearest_within_threshold() {
        let store = IdentityStore::new();
        store.add(1, vec![0.0, 0.0]);
        store.add(2, vec![0.5, 0.0]);

        let m = store
            .classify(&[0.4, 0.0], &MatchPolicy::default())
            .unwrap();

        assert_eq!(m.id, 2);
        assert_relative_eq!(m.distance, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_classify_rejects_beyond_threshold() {
        let store = IdentityStore::new();
        store.add(1, vec![0.0, 0.0]);

        assert!(store
            .classify(&[1.0, 0.0], &MatchPolicy { max_distance: 0.6 })
            .is_none());
    }

    #[test]
    fn test_classify_tie_goes_to_lower_id() {
        let store = IdentityStore::new();
        store.add(9, vec![1.0, 0.0]);
        store.add(3, vec![-1.0, 0.0]);

        let m = store
            .classify(&[0.0, 0.0], &MatchPolicy { max_distance: 2.0 })
            .unwrap();

        assert_eq!(m.id, 3);
    }

    #[test]
    fn test_classify_skips_mismatched_lengths() {
        let store = IdentityStore::new();
        store.add(1, vec![0.0; 128]);
        assert!(store
            .classify(&[0.0; 512], &MatchPolicy::default())
            .is_none());
    }

    #[test]
    fn test_classify_empty_store() {
        let store = IdentityStore::new();
        assert!(store.is_empty());
        assert!(store.classify(&[0.0], &MatchPolicy::default()).is_none());
    }
}
