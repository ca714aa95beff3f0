use std::time::Duration;

use crate::recognition::domain::identity_store::MatchPolicy;
use crate::shared::constants::{
    DEFAULT_DETECTION_INTERVAL, DEFAULT_QUALITY_THRESHOLD, DEFAULT_RECOGNITION_WORKERS,
    DEFAULT_TRACK_PAD_X, DEFAULT_TRACK_PAD_Y,
};
use crate::shared::tracking_error::TrackingError;
use crate::tracking::domain::track_registry::RegistryConfig;

/// Tunables for a [`TrackingEngine`](super::tracking_engine::TrackingEngine).
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub quality_threshold: f64,
    pub pad_x: i32,
    pub pad_y: i32,
    /// Sleep between two detection passes.
    pub detection_interval: Duration,
    pub recognition_workers: usize,
    pub match_policy: MatchPolicy,
    /// Drop a track whose embedding could not be computed.
    pub evict_on_recognition_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            pad_x: DEFAULT_TRACK_PAD_X,
            pad_y: DEFAULT_TRACK_PAD_Y,
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            recognition_workers: DEFAULT_RECOGNITION_WORKERS,
            match_policy: MatchPolicy::default(),
            evict_on_recognition_failure: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.recognition_workers == 0 {
            return Err(TrackingError::InvalidConfig(
                "recognition_workers must be at least 1".into(),
            ));
        }
        if self.pad_x < 0 || self.pad_y < 0 {
            return Err(TrackingError::InvalidConfig(format!(
                "padding must be non-negative, got ({}, {})",
                self.pad_x, self.pad_y
            )));
        }
        if !self.quality_threshold.is_finite() {
            return Err(TrackingError::InvalidConfig(format!(
                "quality_threshold must be finite, got {}",
                self.quality_threshold
            )));
        }
        let max_distance = self.match_policy.max_distance;
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return Err(TrackingError::InvalidConfig(format!(
                "match distance must be positive, got {max_distance}"
            )));
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            quality_threshold: self.quality_threshold,
            pad_x: self.pad_x,
            pad_y: self.pad_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.quality_threshold, 7.0);
        assert_eq!((config.pad_x, config.pad_y), (10, 20));
        assert_eq!(config.detection_interval, Duration::from_millis(500));
        assert_eq!(config.recognition_workers, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_registry_config_mirrors_fields() {
        let config = EngineConfig {
            quality_threshold: 5.0,
            pad_x: 3,
            pad_y: 4,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.registry_config(),
            RegistryConfig {
                quality_threshold: 5.0,
                pad_x: 3,
                pad_y: 4,
            }
        );
    }

    #[rstest]
    #[case::no_workers(EngineConfig { recognition_workers: 0, ..EngineConfig::default() })]
    #[case::negative_pad(EngineConfig { pad_x: -1, ..EngineConfig::default() })]
    #[case::nan_threshold(EngineConfig { quality_threshold: f64::NAN, ..EngineConfig::default() })]
    #[case::zero_distance(EngineConfig {
        match_policy: MatchPolicy { max_distance: 0.0 },
        ..EngineConfig::default()
    })]
    fn test_validate_rejects(#[case] config: EngineConfig) {
        assert!(matches!(
            config.validate(),
            Err(TrackingError::InvalidConfig(_))
        ));
    }
}
