//! Detection settings.
//!
//! Settings are always handled as whole snapshots. Partial updates arrive as a
//! [`SettingsPatch`], are merged onto the current snapshot and the result is
//! validated before anyone can observe it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default motion threshold (area score).
pub const DEFAULT_MOTION_THRESHOLD: u64 = 5000;

/// Upper bound for ROI percentages.
pub const ROI_MAX: u32 = 100;

/// Errors produced when a settings snapshot breaks an invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsValidationError {
    #[error("motion_threshold must be a positive integer")]
    ThresholdNotPositive,

    #[error("{field} must be between 0 and 100 (got {value})")]
    RoiOutOfRange { field: &'static str, value: u32 },

    #[error("{axis} ROI start ({start}) must be less than end ({end})")]
    RoiEmpty {
        axis: &'static str,
        start: u32,
        end: u32,
    },
}

/// Region of interest as percentage bounds on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Roi {
    pub x_start: u32,
    pub x_end: u32,
    pub y_start: u32,
    pub y_end: u32,
}

impl Roi {
    /// The whole frame.
    pub const FULL: Roi = Roi {
        x_start: 0,
        x_end: ROI_MAX,
        y_start: 0,
        y_end: ROI_MAX,
    };

    /// Pixel rectangle `(x, y, width, height)` covered by this ROI in a frame
    /// of the given size. Width or height may be zero for tiny frames.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let scale = |dim: u32, pct: u32| ((dim as u64 * pct.min(ROI_MAX) as u64) / ROI_MAX as u64) as u32;

        let left = scale(width, self.x_start);
        let right = scale(width, self.x_end);
        let top = scale(height, self.y_start);
        let bottom = scale(height, self.y_end);

        (
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    /// Whether this ROI covers the whole frame.
    pub fn is_full_frame(&self) -> bool {
        *self == Roi::FULL
    }
}

impl Default for Roi {
    fn default() -> Self {
        Roi::FULL
    }
}

/// Tunable motion detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionSettings {
    /// Minimum motion area score that counts as motion
    #[serde(rename = "motion_threshold", alias = "threshold")]
    pub threshold: u64,
    pub roi_x_start: u32,
    pub roi_x_end: u32,
    pub roi_y_start: u32,
    pub roi_y_end: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MOTION_THRESHOLD,
            roi_x_start: 0,
            roi_x_end: ROI_MAX,
            roi_y_start: 0,
            roi_y_end: ROI_MAX,
        }
    }
}

impl DetectionSettings {
    /// Region of interest described by these settings.
    pub fn roi(&self) -> Roi {
        Roi {
            x_start: self.roi_x_start,
            x_end: self.roi_x_end,
            y_start: self.roi_y_start,
            y_end: self.roi_y_end,
        }
    }

    /// Check the threshold and ROI invariants.
    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        if self.threshold == 0 {
            return Err(SettingsValidationError::ThresholdNotPositive);
        }

        for (field, value) in [
            ("roi_x_start", self.roi_x_start),
            ("roi_x_end", self.roi_x_end),
            ("roi_y_start", self.roi_y_start),
            ("roi_y_end", self.roi_y_end),
        ] {
            if value > ROI_MAX {
                return Err(SettingsValidationError::RoiOutOfRange { field, value });
            }
        }

        if self.roi_x_start >= self.roi_x_end {
            return Err(SettingsValidationError::RoiEmpty {
                axis: "x",
                start: self.roi_x_start,
                end: self.roi_x_end,
            });
        }
        if self.roi_y_start >= self.roi_y_end {
            return Err(SettingsValidationError::RoiEmpty {
                axis: "y",
                start: self.roi_y_start,
                end: self.roi_y_end,
            });
        }

        Ok(())
    }

    /// Merge a patch onto this snapshot without validating the result.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            threshold: patch.threshold.unwrap_or(self.threshold),
            roi_x_start: patch.roi_x_start.unwrap_or(self.roi_x_start),
            roi_x_end: patch.roi_x_end.unwrap_or(self.roi_x_end),
            roi_y_start: patch.roi_y_start.unwrap_or(self.roi_y_start),
            roi_y_end: patch.roi_y_end.unwrap_or(self.roi_y_end),
        }
    }

    /// Merge a patch and validate the result.
    pub fn try_apply(&self, patch: &SettingsPatch) -> Result<Self, SettingsValidationError> {
        let candidate = self.merged(patch);
        candidate.validate()?;
        Ok(candidate)
    }
}

/// Partial settings update. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SettingsPatch {
    #[serde(
        default,
        rename = "motion_threshold",
        alias = "threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_x_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_x_end: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_y_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_y_end: Option<u32>,
}

impl SettingsPatch {
    /// Patch that sets the horizontal ROI bounds.
    pub fn roi_x(start: u32, end: u32) -> Self {
        Self {
            roi_x_start: Some(start),
            roi_x_end: Some(end),
            ..Default::default()
        }
    }

    /// Patch that sets the vertical ROI bounds.
    pub fn roi_y(start: u32, end: u32) -> Self {
        Self {
            roi_y_start: Some(start),
            roi_y_end: Some(end),
            ..Default::default()
        }
    }

    /// Patch that sets the threshold.
    pub fn threshold(value: u64) -> Self {
        Self {
            threshold: Some(value),
            ..Default::default()
        }
    }

    /// Patch carrying every field of a full snapshot.
    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self {
            threshold: Some(settings.threshold),
            roi_x_start: Some(settings.roi_x_start),
            roi_x_end: Some(settings.roi_x_end),
            roi_y_start: Some(settings.roi_y_start),
            roi_y_end: Some(settings.roi_y_end),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_settings_are_valid() {
        assert_ok!(DetectionSettings::default().validate());
        assert!(DetectionSettings::default().roi().is_full_frame());
    }

    #[test]
    fn test_inverted_roi_rejected() {
        let current = DetectionSettings::default();
        let patch = SettingsPatch {
            roi_x_start: Some(80),
            roi_x_end: Some(20),
            ..Default::default()
        };

        let err = current.try_apply(&patch).unwrap_err();
        assert_eq!(
            err,
            SettingsValidationError::RoiEmpty {
                axis: "x",
                start: 80,
                end: 20
            }
        );
    }

    #[test]
    fn test_equal_bounds_rejected() {
        let current = DetectionSettings::default();
        assert_err!(current.try_apply(&SettingsPatch::roi_y(40, 40)));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let current = DetectionSettings::default();
        let err = current.try_apply(&SettingsPatch::roi_x(10, 101)).unwrap_err();
        assert!(matches!(
            err,
            SettingsValidationError::RoiOutOfRange {
                field: "roi_x_end",
                value: 101
            }
        ));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let current = DetectionSettings::default();
        assert_eq!(
            current.try_apply(&SettingsPatch::threshold(0)),
            Err(SettingsValidationError::ThresholdNotPositive)
        );
    }

    #[test]
    fn test_partial_patch_keeps_other_fields() {
        let current = DetectionSettings {
            threshold: 7000,
            roi_x_start: 33,
            roi_x_end: 66,
            roi_y_start: 5,
            roi_y_end: 95,
        };

        let updated = assert_ok!(current.try_apply(&SettingsPatch::roi_y(10, 90)));
        assert_eq!(updated.threshold, 7000);
        assert_eq!(updated.roi_x_start, 33);
        assert_eq!(updated.roi_x_end, 66);
        assert_eq!(updated.roi_y_start, 10);
        assert_eq!(updated.roi_y_end, 90);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(DetectionSettings::default()).unwrap();
        assert_eq!(json["motion_threshold"], 5000);
        assert_eq!(json["roi_x_end"], 100);

        let patch: SettingsPatch = serde_json::from_str(r#"{"threshold": 1200}"#).unwrap();
        assert_eq!(patch.threshold, Some(1200));
        assert!(patch.roi_x_start.is_none());
    }

    #[test]
    fn test_pixel_bounds() {
        let roi = Roi {
            x_start: 25,
            x_end: 75,
            y_start: 0,
            y_end: 50,
        };
        assert_eq!(roi.pixel_bounds(640, 480), (160, 0, 320, 240));
        assert_eq!(Roi::FULL.pixel_bounds(1920, 1080), (0, 0, 1920, 1080));
    }
}
