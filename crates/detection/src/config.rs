//! Detector configuration, persisted as TOML.
//!
//! This is the state a trained detector carries between sessions: the anchor
//! pyramid parameters, the detectable object size range (derived from the
//! network architecture), thresholds, and the foreground class table. There
//! is no bit-exact wire format requirement beyond internal consistency, so
//! plain TOML through serde is enough.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bbox::OverlapMetric;
use crate::error::{Error, Result};

/// Settings for one suppression pass.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NmsSettings {
    pub metric: OverlapMetric,
    pub threshold: f32,
}

/// Persistent detector parameters.
///
/// All size pairs are `(height, width)` in image pixels. Construction is
/// cheap; nothing is derived until [`DetectorConfig::validate`] has passed,
/// and the pipeline refuses to run on an unvalidated configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// Base anchor shapes, combined with the scale pyramid into the full
    /// anchor set.
    pub base_sizes: Vec<(f32, f32)>,
    /// Ratio between consecutive pyramid levels.
    pub pyramid_scale: f32,
    /// Number of pyramid levels applied to every base size.
    pub num_pyramid_levels: usize,
    /// Smallest detectable object size.
    pub min_object_size: (f32, f32),
    /// Largest detectable object size.
    pub max_object_size: (f32, f32),
    /// Objectness floor for raw proposals.
    pub min_proposal_score: f32,
    /// Class-probability floor for final detections.
    pub score_threshold: f32,
    /// Suppression settings for raw proposals (classically `Union` at 0.7).
    pub proposal_nms: NmsSettings,
    /// Suppression settings for final detections (classically `Min` at 0.5,
    /// so nested duplicates die).
    pub detection_nms: NmsSettings,
    /// Foreground class names; a `ClassId` indexes this table. Background is
    /// not listed, it is the classifier's extra trailing column.
    pub class_names: Vec<String>,
}

impl DetectorConfig {
    /// A starting point with conventional thresholds; callers still have to
    /// fill in the class table before the config validates.
    #[must_use]
    pub fn with_classes(class_names: Vec<String>) -> Self {
        DetectorConfig {
            base_sizes: vec![(32.0, 32.0), (48.0, 24.0), (24.0, 48.0)],
            pyramid_scale: 2.0,
            num_pyramid_levels: 3,
            min_object_size: (16.0, 16.0),
            max_object_size: (5000.0, 5000.0),
            min_proposal_score: 0.5,
            score_threshold: 0.5,
            proposal_nms: NmsSettings {
                metric: OverlapMetric::Union,
                threshold: 0.7,
            },
            detection_nms: NmsSettings {
                metric: OverlapMetric::Min,
                threshold: 0.5,
            },
            class_names,
        }
    }

    /// Total number of anchor shapes in the pyramid.
    #[must_use]
    pub fn num_anchors(&self) -> usize {
        self.base_sizes.len() * self.num_pyramid_levels
    }

    /// Number of foreground classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Reject structurally invalid configurations before any image is
    /// processed.
    pub fn validate(&self) -> Result<()> {
        if self.base_sizes.is_empty() || self.num_pyramid_levels == 0 {
            return Err(Error::EmptyAnchorTable {
                base_sizes: self.base_sizes.len(),
                levels: self.num_pyramid_levels,
            });
        }

        for &size in &self.base_sizes {
            if !positive_finite(size) {
                return Err(Error::InvalidAnchorSize { size });
            }
        }

        if !self.pyramid_scale.is_finite() || self.pyramid_scale < 1.0 {
            return Err(Error::PyramidScale {
                value: self.pyramid_scale,
            });
        }

        validate_size_range(self.min_object_size, self.max_object_size)?;

        for (name, value) in [
            ("min_proposal_score", self.min_proposal_score),
            ("score_threshold", self.score_threshold),
        ] {
            if !value.is_finite() {
                return Err(Error::NonFiniteThreshold { name, value });
            }
        }

        for (name, settings) in [
            ("proposal_nms", self.proposal_nms),
            ("detection_nms", self.detection_nms),
        ] {
            if !settings.threshold.is_finite() || !(0.0..=1.0).contains(&settings.threshold) {
                return Err(Error::ThresholdRange {
                    name,
                    value: settings.threshold,
                });
            }
        }

        if self.class_names.is_empty() {
            return Err(Error::EmptyClassTable);
        }

        Ok(())
    }

    /// Load and validate a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;

        let config: DetectorConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the config as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|source| Error::WriteConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn positive_finite((height, width): (f32, f32)) -> bool {
    height.is_finite() && width.is_finite() && height > 0.0 && width > 0.0
}

/// Shared by config validation and the per-call size overrides.
pub(crate) fn validate_size_range(min: (f32, f32), max: (f32, f32)) -> Result<()> {
    if !positive_finite(min) {
        return Err(Error::InvalidObjectSize { size: min });
    }
    if !positive_finite(max) {
        return Err(Error::InvalidObjectSize { size: max });
    }
    if min.0 > max.0 || min.1 > max.1 {
        return Err(Error::SizeRange { min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::with_classes(vec!["person".into(), "car".into()])
    }

    #[test]
    fn conventional_config_validates() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn min_size_above_max_size_is_rejected() {
        let mut config = config();
        config.min_object_size = (100.0, 100.0);
        config.max_object_size = (50.0, 50.0);
        assert!(matches!(config.validate(), Err(Error::SizeRange { .. })));
    }

    #[test]
    fn empty_class_table_is_rejected() {
        let config = DetectorConfig::with_classes(Vec::new());
        assert!(matches!(config.validate(), Err(Error::EmptyClassTable)));
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let mut config = config();
        config.score_threshold = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(Error::NonFiniteThreshold {
                name: "score_threshold",
                ..
            })
        ));
    }

    #[test]
    fn nms_threshold_outside_unit_interval_is_rejected() {
        let mut config = config();
        config.proposal_nms.threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(Error::ThresholdRange {
                name: "proposal_nms",
                ..
            })
        ));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = config();
        let raw = toml::to_string_pretty(&config).unwrap();
        let back: DetectorConfig = toml::from_str(&raw).unwrap();

        assert_eq!(back.base_sizes, config.base_sizes);
        assert_eq!(back.class_names, config.class_names);
        assert_eq!(back.detection_nms.metric, OverlapMetric::Min);
    }
}
