//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis from facial landmarks:
//! - Eye point selection and openness ratio
//! - Debounced drowsiness alarm state machine
//! - Face visibility tracking

pub mod analysis;
pub mod config;
pub mod geometry;
pub mod landmarks;
pub mod provider;
pub mod state;

pub use analysis::{DmsAlert, DmsAnalysis};
pub use config::{DmsConfig, DrowsinessConfig, NoFacePolicy};
pub use geometry::{openness_ratio, EyeMeasurement};
pub use landmarks::{CoordinateSpace, EyeIndexMap, EyeLandmarks, EyeRole, FaceLandmarks, Point2D};
pub use provider::{LandmarkProvider, ReplayProvider};
pub use state::{observe, AlarmTransition, DetectorState, DrowsinessDetector, FrameObservation};

use camera_capture::VideoFrame;
use thiserror::Error;
use tracing::{debug, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Invalid landmark set: expected {expected} points, got {actual}")]
    InvalidLandmarkSet { expected: usize, actual: usize },

    #[error("Landmark p{} is not a finite coordinate", .position + 1)]
    NonFiniteLandmark { position: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Landmark provider failed: {0}")]
    Provider(String),
}

/// Driver monitoring module
pub struct DmsModule<P> {
    config: DmsConfig,
    provider: P,
    detector: DrowsinessDetector,
    face_absent_frames: u32,
}

impl<P: LandmarkProvider> DmsModule<P> {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig, provider: P) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            detector: DrowsinessDetector::new(config.drowsiness.clone()),
            provider,
            config,
            face_absent_frames: 0,
        })
    }

    /// Analyze a single frame for driver state.
    ///
    /// A malformed landmark set (wrong point count, missing index or a
    /// non-finite coordinate) fails the frame before the state machine is
    /// touched.
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<DmsAnalysis, DmsError> {
        let face = self.provider.detect(frame)?;

        let (measurement, eyes) = match face {
            Some(face) => {
                let eyes = face
                    .to_pixels(frame.width, frame.height)
                    .eyes(&self.config.eyes)?;
                self.face_absent_frames = 0;
                (Some(EyeMeasurement::from_eyes(&eyes)), Some(eyes))
            }
            None => {
                self.face_absent_frames = self.face_absent_frames.saturating_add(1);
                (None, None)
            }
        };

        let transition = self.detector.observe(FrameObservation::from(measurement));
        let state = self.detector.state();

        if let Some(m) = &measurement {
            debug!(
                "frame {}: EAR={:.3} (L={:.3} R={:.3})",
                frame.sequence, m.average, m.left, m.right
            );
        }

        let mut alerts = Vec::new();
        if state.alarm_active() {
            alerts.push(DmsAlert::Drowsiness);
        }
        let absent_limit = self.config.face_absent_alert_frames;
        if absent_limit > 0 && self.face_absent_frames > absent_limit {
            if self.face_absent_frames == absent_limit + 1 {
                warn!("Face not visible for {} frames", self.face_absent_frames);
            }
            alerts.push(DmsAlert::FaceNotVisible);
        }

        Ok(DmsAnalysis {
            sequence: frame.sequence,
            face_detected: measurement.is_some(),
            eye_measurement: measurement,
            eyes,
            transition,
            alarm_active: state.alarm_active(),
            consecutive_closed_frames: state.consecutive_closed_count(),
            alerts,
        })
    }

    /// Current detector state
    pub fn state(&self) -> &DetectorState {
        self.detector.state()
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    /// Reset driver state (on driver change)
    pub fn reset_state(&mut self) {
        self.detector.reset();
        self.face_absent_frames = 0;
    }
}
