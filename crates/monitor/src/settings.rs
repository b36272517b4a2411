//! Layered runtime settings
//!
//! Defaults, then `monitor.toml` in the working directory (optional), then an
//! explicit config file, then `MONITOR__*` environment variables.

use std::path::{Path, PathBuf};

use alerting::AlarmConfig;
use camera_capture::CameraConfig;
use config::{Config, Environment, File};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};

use crate::MonitorError;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub camera: CameraConfig,
    pub dms: DmsConfig,
    pub landmarks: LandmarkSettings,
    pub alarm: AlarmConfig,
    pub display: DisplaySettings,
    pub log: LogSettings,
}

/// Status API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Landmark source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkSettings {
    /// JSON-lines landmark trace to replay
    pub trace: Option<PathBuf>,
    /// Pace frames at the camera FPS instead of as fast as possible
    pub realtime: bool,
}

impl Default for LandmarkSettings {
    fn default() -> Self {
        Self {
            trace: None,
            realtime: true,
        }
    }
}

/// Overlay output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Log the overlay text
    pub log_overlay: bool,
    /// Directory for PNG snapshots (disabled when unset)
    pub snapshot_dir: Option<PathBuf>,
    /// Save every Nth frame
    pub snapshot_every: u64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            log_overlay: true,
            snapshot_dir: None,
            snapshot_every: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from all layers
    pub fn load(path: Option<&Path>) -> Result<Self, MonitorError> {
        let mut builder = Config::builder().add_source(File::with_name("monitor").required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("MONITOR").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        self.camera.validate()?;
        self.dms.validate()?;
        Ok(())
    }
}
