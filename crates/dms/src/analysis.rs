//! DMS analysis results and alerts

use serde::{Deserialize, Serialize};

use crate::geometry::EyeMeasurement;
use crate::landmarks::EyeLandmarks;
use crate::state::AlarmTransition;

/// DMS alert types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmsAlert {
    /// Eyes closed for longer than the configured run of frames
    Drowsiness,

    /// Face not visible (camera blocked?)
    FaceNotVisible,
}

/// Complete DMS analysis result for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Sequence number of the analyzed frame
    pub sequence: u64,

    /// Whether a face was detected
    pub face_detected: bool,

    /// Eye openness (if a face was detected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_measurement: Option<EyeMeasurement>,

    /// Pixel-space eye points, left then right
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes: Option<[EyeLandmarks; 2]>,

    /// Alarm transition emitted for this frame
    pub transition: AlarmTransition,

    /// Whether the drowsiness alarm is on after this frame
    pub alarm_active: bool,

    /// Current run of closed-eye frames
    pub consecutive_closed_frames: u32,

    /// Active alerts
    pub alerts: Vec<DmsAlert>,
}

impl DmsAnalysis {
    /// Check if any alerts are active
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// Get highest severity alert
    pub fn highest_severity_alert(&self) -> Option<DmsAlert> {
        if self.alerts.contains(&DmsAlert::Drowsiness) {
            Some(DmsAlert::Drowsiness)
        } else {
            self.alerts.first().copied()
        }
    }

    /// Averaged openness ratio for display
    pub fn average_ratio(&self) -> Option<f32> {
        self.eye_measurement.map(|m| m.average)
    }
}
