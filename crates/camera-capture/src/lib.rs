//! Camera Capture Library for Driver Monitoring
//!
//! Provides the frame types and frame sources consumed by the DMS pipeline.
//! Supports:
//! - Cabin camera frames (640x480 @ 15fps by default)
//! - Synthetic sources for headless runs and tests

pub mod frame;
pub mod source;

pub use frame::VideoFrame;
pub use source::{FrameSource, SyntheticSource};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Invalid format: {0}")]
    Format(String),
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Stop after this many frames (unbounded when `None`)
    pub max_frames: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            max_frames: None,
        }
    }
}

impl CameraConfig {
    /// Create cabin camera config (DMS)
    pub fn cabin() -> Self {
        Self::default()
    }

    /// Frame period derived from the target FPS
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / u64::from(self.fps.max(1)))
    }

    /// Check dimensions and rate before a source is opened
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!(
                "frame size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(CameraError::Format("fps must be at least 1".into()));
        }
        Ok(())
    }
}
