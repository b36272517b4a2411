//! Frame sources

use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame};

/// Anything that yields frames for the monitoring loop.
///
/// `Ok(None)` means the source is exhausted and the loop should end.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;
}

/// Produces blank frames at the configured size and rate.
///
/// Used for headless runs where landmarks come from a recorded trace
/// rather than from live pixels.
pub struct SyntheticSource {
    config: CameraConfig,
    sequence: u64,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Result<Self, CameraError> {
        config.validate()?;
        info!(
            "Opening synthetic source {}x{} @ {}fps (limit: {:?})",
            config.width, config.height, config.fps, config.max_frames
        );
        Ok(Self { config, sequence: 0 })
    }

    /// Number of frames produced so far
    pub fn frames_emitted(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if let Some(limit) = self.config.max_frames {
            if self.sequence >= limit {
                debug!("Synthetic source exhausted after {} frames", self.sequence);
                return Ok(None);
            }
        }

        let period_ns = self.config.frame_interval().as_nanos() as u64;
        let frame = VideoFrame::blank(
            self.config.width,
            self.config.height,
            self.sequence * period_ns,
            self.sequence,
        );
        self.sequence += 1;
        Ok(Some(frame))
    }
}
