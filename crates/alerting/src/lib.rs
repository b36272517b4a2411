//! Alerting System
//!
//! Reacts to drowsiness alarm transitions: drives the alarm sound and the
//! on-screen overlay.

mod actuator;
mod display;
mod sound;

pub use actuator::{
    AlarmCommand, AlarmConfig, AlertActuator, AlertDispatcher, AudioAlarm, LogActuator,
    RecordingActuator, TerminalBell, ToneOutput,
};
pub use display::{DisplaySink, LogDisplay, Overlay, SnapshotDisplay};
pub use sound::{open_tone_output, FallbackTone, SoundClip};

use camera_capture::CameraError;
use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Display I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Frame conversion failed: {0}")]
    Frame(#[from] CameraError),

    #[error("Alarm sound error: {0}")]
    Sound(#[from] hound::Error),
}
