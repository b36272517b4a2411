//! Drowsiness state machine
//!
//! Turns per-frame eye openness into a debounced alarm signal. The alarm
//! starts after `consecutive_frames_required` closed frames in a row and
//! stops on the first open-eye frame.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DrowsinessConfig, NoFacePolicy};
use crate::geometry::EyeMeasurement;

/// Per-frame input to the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameObservation {
    FaceDetected { left: f32, right: f32 },
    NoFaceDetected,
}

impl FrameObservation {
    /// Averaged openness, if a face was seen
    pub fn average(&self) -> Option<f32> {
        match *self {
            FrameObservation::FaceDetected { left, right } => Some((left + right) / 2.0),
            FrameObservation::NoFaceDetected => None,
        }
    }
}

impl From<Option<EyeMeasurement>> for FrameObservation {
    fn from(measurement: Option<EyeMeasurement>) -> Self {
        match measurement {
            Some(m) => FrameObservation::FaceDetected {
                left: m.left,
                right: m.right,
            },
            None => FrameObservation::NoFaceDetected,
        }
    }
}

/// Per-frame output of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlarmTransition {
    Started,
    Stopped,
    #[default]
    Unchanged,
}

/// Counter and alarm flag carried between frames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorState {
    consecutive_closed_count: u32,
    alarm_active: bool,
}

impl DetectorState {
    pub fn consecutive_closed_count(&self) -> u32 {
        self.consecutive_closed_count
    }

    pub fn alarm_active(&self) -> bool {
        self.alarm_active
    }
}

/// Advance the state machine by one frame.
pub fn observe(
    obs: FrameObservation,
    cfg: &DrowsinessConfig,
    state: &mut DetectorState,
) -> AlarmTransition {
    let avg = match obs.average() {
        Some(avg) => avg,
        None => {
            // A missing face never counts as closure and never silences
            if cfg.no_face_policy == NoFacePolicy::ResetProgress {
                state.consecutive_closed_count = 0;
            }
            return AlarmTransition::Unchanged;
        }
    };

    if avg < cfg.threshold {
        state.consecutive_closed_count = state.consecutive_closed_count.saturating_add(1);
        if state.consecutive_closed_count >= cfg.consecutive_frames_required && !state.alarm_active
        {
            state.alarm_active = true;
            return AlarmTransition::Started;
        }
    } else {
        state.consecutive_closed_count = 0;
        if state.alarm_active {
            state.alarm_active = false;
            return AlarmTransition::Stopped;
        }
    }

    AlarmTransition::Unchanged
}

/// Owns the configuration and state for one monitored driver
#[derive(Debug, Clone)]
pub struct DrowsinessDetector {
    config: DrowsinessConfig,
    state: DetectorState,
}

impl DrowsinessDetector {
    pub fn new(config: DrowsinessConfig) -> Self {
        info!(
            "Drowsiness detector: threshold={:.3}, frames={}, no_face={:?}",
            config.threshold, config.consecutive_frames_required, config.no_face_policy
        );
        Self {
            config,
            state: DetectorState::default(),
        }
    }

    pub fn observe(&mut self, obs: FrameObservation) -> AlarmTransition {
        let transition = observe(obs, &self.config, &mut self.state);
        match transition {
            AlarmTransition::Started => info!(
                "Drowsiness alarm started after {} closed frames",
                self.state.consecutive_closed_count
            ),
            AlarmTransition::Stopped => info!("Drowsiness alarm stopped: eyes reopened"),
            AlarmTransition::Unchanged => debug!(
                "closed={} active={}",
                self.state.consecutive_closed_count, self.state.alarm_active
            ),
        }
        transition
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn config(&self) -> &DrowsinessConfig {
        &self.config
    }

    /// Reset state (on driver change)
    pub fn reset(&mut self) {
        self.state = DetectorState::default();
    }
}
