//! Drowsiness Monitor
//!
//! Wires the frame source, DMS analysis and alarm actuation into a running
//! service, with a read-only status API for dashboards.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod routes;

pub mod pipeline;
pub mod settings;

pub use pipeline::{Monitor, MonitorStatus, RunSummary, SharedStatus};
pub use settings::{LogFormat, LogSettings, Settings};

use alerting::{
    open_tone_output, AlertActuator, AlertError, AudioAlarm, DisplaySink, LogActuator, LogDisplay,
    SnapshotDisplay,
};
use camera_capture::{CameraError, SyntheticSource};
use dms::{DmsError, DmsModule, ReplayProvider};

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Application state shared across handlers
pub struct AppState {
    /// Latest pipeline state
    pub status: SharedStatus,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(status: SharedStatus) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub frames_processed: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::status::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let frames_processed = state.status.read().await.frames_processed;

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        frames_processed,
    })
}

/// Initialize logging
pub fn init_logging(log: &LogSettings) -> Result<(), MonitorError> {
    let level: Level = log
        .level
        .parse()
        .map_err(|_| MonitorError::Logging(format!("unknown log level {:?}", log.level)))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = match log.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
    };
    result.map_err(|e| MonitorError::Logging(e.to_string()))
}

/// Serve the status API until the process exits
pub async fn run_server(addr: &str, status: SharedStatus) -> Result<(), MonitorError> {
    let app = create_router(Arc::new(AppState::new(status)));

    info!("Starting status API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the monitor with the given settings until the landmark trace ends or
/// Ctrl-C is pressed
pub async fn run(settings: Settings) -> Result<RunSummary, MonitorError> {
    settings.validate()?;
    let status = SharedStatus::default();

    let server = settings.server.enabled.then(|| {
        let addr = settings.server.addr.clone();
        let status = status.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, status).await {
                warn!("Status API stopped: {}", e);
            }
        })
    });

    let result = if settings.alarm.enabled {
        let alarm = AudioAlarm::spawn(&settings.alarm, open_tone_output(&settings.alarm));
        let (result, alarm) = drive(&settings, alarm, status, shutdown_signal()).await;
        alarm.shutdown().await;
        result
    } else {
        drive(&settings, LogActuator, status, shutdown_signal()).await.0
    };

    if let Some(server) = server {
        server.abort();
    }
    result
}

/// Run the frame loop, handing the actuator back even when setup or the loop
/// fails so the caller can shut it down
async fn drive<A, F>(
    settings: &Settings,
    actuator: A,
    status: SharedStatus,
    shutdown: F,
) -> (Result<RunSummary, MonitorError>, A)
where
    A: AlertActuator,
    F: Future<Output = ()>,
{
    let (source, dms, displays) = match prepare(settings) {
        Ok(parts) => parts,
        Err(e) => return (Err(e), actuator),
    };

    let mut monitor = Monitor::new(source, dms, actuator, status);
    if settings.landmarks.realtime {
        monitor = monitor.with_pacing(settings.camera.frame_interval());
    }
    for display in displays {
        monitor = monitor.with_display(display);
    }

    let result = monitor.run(shutdown).await;
    (result, monitor.into_actuator())
}

type PipelineParts = (
    SyntheticSource,
    DmsModule<ReplayProvider>,
    Vec<Box<dyn DisplaySink>>,
);

fn prepare(settings: &Settings) -> Result<PipelineParts, MonitorError> {
    let provider = match &settings.landmarks.trace {
        Some(path) => ReplayProvider::open(path)?,
        None => {
            warn!("No landmark trace configured; every frame will report no face");
            ReplayProvider::from_records(Vec::new())
        }
    };
    let dms = DmsModule::new(settings.dms.clone(), provider)?;
    let source = SyntheticSource::new(settings.camera.clone())?;

    let mut displays: Vec<Box<dyn DisplaySink>> = Vec::new();
    if settings.display.log_overlay {
        displays.push(Box::new(LogDisplay::default()));
    }
    if let Some(dir) = &settings.display.snapshot_dir {
        displays.push(Box::new(SnapshotDisplay::new(
            dir,
            settings.display.snapshot_every,
        )?));
    }
    Ok((source, dms, displays))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{AlarmCommand, RecordingActuator};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::io::Write;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let status = SharedStatus::default();
        status.write().await.frames_processed = 42;
        let app = create_router(Arc::new(AppState::new(status)));

        let json = get_json(app, "/api/v1/health").await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["frames_processed"], 42);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let status = SharedStatus::default();
        {
            let mut s = status.write().await;
            s.alarm_active = true;
            s.consecutive_closed_frames = 25;
            s.alarms_started = 1;
        }
        let app = create_router(Arc::new(AppState::new(status)));

        let json = get_json(app, "/api/v1/status").await;
        assert_eq!(json["alarm_active"], true);
        assert_eq!(json["consecutive_closed_frames"], 25);
        assert_eq!(json["alarms_started"], 1);
        assert!(json["ratio"].is_null());
    }

    #[tokio::test]
    async fn test_drive_replays_trace() {
        // Minimal face: 12 points, eyes mapped to 0..6 and 6..12
        let open = r#"[[0,0],[10,-6],[20,-6],[30,0],[20,6],[10,6],[40,0],[50,-6],[60,-6],[70,0],[60,6],[50,6]]"#;
        let closed = r#"[[0,0],[10,0],[20,0],[30,0],[20,0],[10,0],[40,0],[50,0],[60,0],[70,0],[60,0],[50,0]]"#;

        let dir = tempfile::tempdir().unwrap();
        let trace_path = dir.path().join("trace.jsonl");
        let mut trace = std::fs::File::create(&trace_path).unwrap();
        for points in [open, closed, closed, closed, open] {
            writeln!(trace, r#"{{"landmarks": {}, "space": "pixel"}}"#, points).unwrap();
        }

        let mut settings = Settings::default();
        settings.server.enabled = false;
        settings.camera.max_frames = Some(5);
        settings.landmarks.trace = Some(trace_path);
        settings.landmarks.realtime = false;
        settings.display.snapshot_dir = Some(dir.path().join("snaps"));
        settings.display.snapshot_every = 1;
        settings.dms.drowsiness.consecutive_frames_required = 3;
        settings.dms.eyes.left = [0, 1, 2, 3, 4, 5];
        settings.dms.eyes.right = [6, 7, 8, 9, 10, 11];

        let status = SharedStatus::default();
        let recorder = RecordingActuator::new();
        let (result, _) =
            drive(&settings, recorder.clone(), status.clone(), std::future::pending()).await;
        let summary = result.unwrap();

        assert_eq!(summary.frames_processed, 5);
        assert_eq!(summary.alarms_started, 1);
        assert_eq!(recorder.calls(), vec![AlarmCommand::Start, AlarmCommand::Stop]);
        assert!(dir.path().join("snaps/frame_000003.png").exists());
    }

    #[tokio::test]
    async fn test_drive_missing_trace() {
        let mut settings = Settings::default();
        settings.landmarks.trace = Some("/nonexistent/trace.jsonl".into());

        let recorder = RecordingActuator::new();
        let (result, actuator) = drive(
            &settings,
            recorder.clone(),
            SharedStatus::default(),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(MonitorError::Dms(DmsError::Provider(_)))));
        // The actuator comes back for shutdown and was never started
        assert!(actuator.calls().is_empty());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let log = LogSettings {
            level: "verbose".to_string(),
            ..Default::default()
        };
        let err = init_logging(&log).unwrap_err();
        assert!(matches!(err, MonitorError::Logging(msg) if msg.contains("verbose")));
    }
}
