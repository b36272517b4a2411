//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::landmarks::EyeIndexMap;
use crate::DmsError;

/// What a frame without a detected face does to the closed-eye counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoFacePolicy {
    /// Reset closure progress; an active alarm stays on
    #[default]
    ResetProgress,
    /// Leave counter and alarm untouched (legacy behaviour)
    Hold,
}

/// Drowsiness detection tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrowsinessConfig {
    /// Averaged openness ratio below which the eyes count as closed
    pub threshold: f32,

    /// Consecutive closed frames before the alarm starts
    pub consecutive_frames_required: u32,

    /// Handling of frames where no face was found
    pub no_face_policy: NoFacePolicy,
}

impl Default for DrowsinessConfig {
    fn default() -> Self {
        Self {
            threshold: 0.27,
            consecutive_frames_required: 20,
            no_face_policy: NoFacePolicy::ResetProgress,
        }
    }
}

impl DrowsinessConfig {
    pub fn new(threshold: f32, consecutive_frames_required: u32) -> Result<Self, DmsError> {
        let config = Self {
            threshold,
            consecutive_frames_required,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Create strict config (alarms sooner)
    pub fn strict() -> Self {
        Self {
            threshold: 0.29,
            consecutive_frames_required: 12,
            ..Default::default()
        }
    }

    /// Create lenient config (fewer false alarms)
    pub fn lenient() -> Self {
        Self {
            threshold: 0.25,
            consecutive_frames_required: 48,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), DmsError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DmsError::Config(format!(
                "threshold must be a finite non-negative ratio, got {}",
                self.threshold
            )));
        }
        if self.consecutive_frames_required == 0 {
            return Err(DmsError::Config(
                "consecutive_frames_required must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Drowsiness state machine tunables
    pub drowsiness: DrowsinessConfig,

    /// Provider index of each eye point
    pub eyes: EyeIndexMap,

    /// Frames without a face before raising `FaceNotVisible` (0 disables)
    pub face_absent_alert_frames: u32,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            drowsiness: DrowsinessConfig::default(),
            eyes: EyeIndexMap::default(),
            face_absent_alert_frames: 30,
        }
    }
}

impl DmsConfig {
    pub fn validate(&self) -> Result<(), DmsError> {
        self.drowsiness.validate()
    }
}
