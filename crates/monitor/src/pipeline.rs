//! Frame-by-frame monitoring loop
//!
//! Pulls a frame, runs the DMS analysis, forwards the alarm transition to
//! the actuator and renders the overlay. One frame is fully processed
//! before the next is requested.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alerting::{AlertActuator, AlertDispatcher, DisplaySink, Overlay};
use camera_capture::FrameSource;
use dms::{DmsAnalysis, DmsError, DmsModule, LandmarkProvider};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::MonitorError;

/// Latest pipeline state, shared read-only with the status API
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub frames_processed: u64,
    pub last_sequence: Option<u64>,
    /// Averaged openness ratio of the latest frame; `None` when it had no face
    pub ratio: Option<f32>,
    pub face_detected: bool,
    pub alarm_active: bool,
    pub consecutive_closed_frames: u32,
    pub alarms_started: u64,
    /// Frames dropped because of a malformed or non-finite landmark set
    pub invalid_frames: u64,
}

impl MonitorStatus {
    fn record(&mut self, analysis: &DmsAnalysis, alarms_started: u64) {
        self.frames_processed += 1;
        self.last_sequence = Some(analysis.sequence);
        self.ratio = analysis.average_ratio();
        self.face_detected = analysis.face_detected;
        self.alarm_active = analysis.alarm_active;
        self.consecutive_closed_frames = analysis.consecutive_closed_frames;
        self.alarms_started = alarms_started;
    }
}

pub type SharedStatus = Arc<RwLock<MonitorStatus>>;

/// Totals reported when the loop ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub alarms_started: u64,
}

/// Drives one monitored camera
pub struct Monitor<S, P, A> {
    source: S,
    dms: DmsModule<P>,
    dispatcher: AlertDispatcher<A>,
    displays: Vec<Box<dyn DisplaySink>>,
    status: SharedStatus,
    pacing: Option<Duration>,
}

impl<S, P, A> Monitor<S, P, A>
where
    S: FrameSource,
    P: LandmarkProvider,
    A: AlertActuator,
{
    pub fn new(source: S, dms: DmsModule<P>, actuator: A, status: SharedStatus) -> Self {
        Self {
            source,
            dms,
            dispatcher: AlertDispatcher::new(actuator),
            displays: Vec::new(),
            status,
            pacing: None,
        }
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.displays.push(display);
        self
    }

    /// Process at most one frame per `interval`
    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacing = Some(interval);
        self
    }

    /// Process one frame. Returns `false` once the source is exhausted.
    pub async fn step(&mut self) -> Result<bool, MonitorError> {
        let frame = match self.source.next_frame()? {
            Some(frame) => frame,
            None => return Ok(false),
        };

        let analysis = match self.dms.analyze(&frame) {
            Ok(analysis) => analysis,
            Err(e @ (DmsError::InvalidLandmarkSet { .. } | DmsError::NonFiniteLandmark { .. })) => {
                warn!("Frame {}: skipping malformed landmark set: {}", frame.sequence, e);
                self.status.write().await.invalid_frames += 1;
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        self.dispatcher.dispatch(analysis.transition);

        let overlay = Overlay::from_analysis(&analysis);
        for display in &mut self.displays {
            if let Err(e) = display.render(&frame, &overlay) {
                warn!("Frame {}: display failed: {}", frame.sequence, e);
            }
        }

        self.status
            .write()
            .await
            .record(&analysis, self.dispatcher.alarms_started());
        Ok(true)
    }

    /// Run until the source is exhausted, `shutdown` resolves or a frame
    /// fails. An alarm still sounding when the loop ends is stopped, whatever
    /// the reason.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary, MonitorError>
    where
        F: Future<Output = ()>,
    {
        info!("Monitoring loop started");
        let result = self.run_loop(shutdown).await;
        self.finish().await;

        if let Err(e) = &result {
            error!("Monitoring loop failed: {}", e);
        }
        result?;

        let summary = RunSummary {
            frames_processed: self.status.read().await.frames_processed,
            alarms_started: self.dispatcher.alarms_started(),
        };
        info!(
            "Monitoring loop stopped: {} frames, {} alarms",
            summary.frames_processed, summary.alarms_started
        );
        Ok(summary)
    }

    async fn run_loop<F>(&mut self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = self.pacing.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = next_tick(&mut ticker) => {}
            }

            if !self.step().await? {
                info!("Frame source exhausted");
                return Ok(());
            }
        }
    }

    /// Silence an alarm left on when the loop ends
    async fn finish(&mut self) {
        if self.dms.state().alarm_active() {
            debug!("Stopping alarm still active at shutdown");
            self.dispatcher.actuator().stop();
            self.status.write().await.alarm_active = false;
        }
    }

    pub fn into_actuator(self) -> A {
        self.dispatcher.into_inner()
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{AlarmCommand, LogDisplay, RecordingActuator};
    use camera_capture::{CameraConfig, SyntheticSource};
    use camera_capture::VideoFrame;
    use dms::{
        CoordinateSpace, DmsConfig, DrowsinessConfig, EyeIndexMap, FaceLandmarks, Point2D,
        ReplayProvider,
    };

    fn face_with_ratio(ratio: f32, map: &EyeIndexMap) -> FaceLandmarks {
        let mut points = vec![Point2D::default(); map.max_index() + 1];
        let half = ratio * 30.0 / 2.0;
        for (indices, x0) in [(&map.left, 0.6), (&map.right, 0.3)] {
            let x0 = x0 * 640.0;
            let eye = [
                Point2D::new(x0, 240.0),
                Point2D::new(x0 + 10.0, 240.0 - half),
                Point2D::new(x0 + 20.0, 240.0 - half),
                Point2D::new(x0 + 30.0, 240.0),
                Point2D::new(x0 + 20.0, 240.0 + half),
                Point2D::new(x0 + 10.0, 240.0 + half),
            ];
            for (&i, p) in indices.iter().zip(eye) {
                points[i] = p;
            }
        }
        FaceLandmarks::new(points, CoordinateSpace::Pixel)
    }

    fn monitor(
        trace: Vec<Option<FaceLandmarks>>,
        required: u32,
    ) -> (
        Monitor<SyntheticSource, ReplayProvider, RecordingActuator>,
        RecordingActuator,
        SharedStatus,
    ) {
        let camera = CameraConfig {
            max_frames: Some(trace.len() as u64),
            ..Default::default()
        };
        let config = DmsConfig {
            drowsiness: DrowsinessConfig::new(0.27, required).unwrap(),
            ..Default::default()
        };
        let dms = DmsModule::new(config, ReplayProvider::from_records(trace)).unwrap();
        let recorder = RecordingActuator::new();
        let status = SharedStatus::default();
        let monitor = Monitor::new(
            SyntheticSource::new(camera).unwrap(),
            dms,
            recorder.clone(),
            status.clone(),
        )
        .with_display(Box::new(LogDisplay::default()));
        (monitor, recorder, status)
    }

    fn faces(ratios: &[f32]) -> Vec<Option<FaceLandmarks>> {
        let map = EyeIndexMap::default();
        ratios.iter().map(|&r| Some(face_with_ratio(r, &map))).collect()
    }

    #[tokio::test]
    async fn test_alarm_started_and_stopped() {
        let (mut monitor, recorder, status) = monitor(faces(&[0.30, 0.20, 0.20, 0.20, 0.30]), 3);

        let summary = monitor.run(std::future::pending()).await.unwrap();

        assert_eq!(summary.frames_processed, 5);
        assert_eq!(summary.alarms_started, 1);
        assert_eq!(recorder.calls(), vec![AlarmCommand::Start, AlarmCommand::Stop]);

        let status = status.read().await;
        assert_eq!(status.last_sequence, Some(4));
        assert!(!status.alarm_active);
        assert!((status.ratio.unwrap() - 0.30).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_alarm_silenced_when_source_ends() {
        let (mut monitor, recorder, _status) = monitor(faces(&[0.1, 0.1, 0.1]), 2);

        monitor.run(std::future::pending()).await.unwrap();

        assert_eq!(recorder.calls(), vec![AlarmCommand::Start, AlarmCommand::Stop]);
    }

    #[tokio::test]
    async fn test_no_face_frames_keep_running() {
        let mut trace = faces(&[0.1, 0.1]);
        trace.push(None);
        trace.extend(faces(&[0.1]));
        let (mut monitor, recorder, status) = monitor(trace, 3);

        let summary = monitor.run(std::future::pending()).await.unwrap();

        assert_eq!(summary.frames_processed, 4);
        assert!(recorder.calls().is_empty());
        assert_eq!(status.read().await.consecutive_closed_frames, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_skipped() {
        let mut trace = faces(&[0.1]);
        trace.push(Some(FaceLandmarks::new(
            vec![Point2D::default(); 5],
            CoordinateSpace::Pixel,
        )));
        trace.extend(faces(&[0.1]));
        let (mut monitor, recorder, status) = monitor(trace, 2);

        monitor.run(std::future::pending()).await.unwrap();

        let status = status.read().await;
        assert_eq!(status.invalid_frames, 1);
        assert_eq!(status.frames_processed, 2);
        // Skipped frame neither advanced nor reset the run
        assert_eq!(recorder.calls(), vec![AlarmCommand::Start, AlarmCommand::Stop]);
    }

    #[tokio::test]
    async fn test_non_finite_frame_keeps_alarm_on() {
        let mut trace = faces(&[0.1, 0.1]);
        let mut broken = face_with_ratio(0.1, &EyeIndexMap::default());
        broken.points[EyeIndexMap::default().left[0]] = Point2D::new(f32::INFINITY, 240.0);
        trace.push(Some(broken));
        let (mut monitor, recorder, status) = monitor(trace, 2);

        while monitor.step().await.unwrap() {}

        let status = status.read().await;
        assert_eq!(status.invalid_frames, 1);
        assert!(status.alarm_active);
        assert_eq!(recorder.calls(), vec![AlarmCommand::Start]);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_frame() {
        let (mut monitor, recorder, _status) = monitor(faces(&[0.1, 0.1]), 1);

        let summary = monitor.run(std::future::ready(())).await.unwrap();

        assert_eq!(summary.frames_processed, 0);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_loop() {
        let (monitor, _recorder, _status) = monitor(faces(&[0.3; 5]), 3);
        let mut monitor = monitor.with_pacing(Duration::from_millis(100));

        let begin = tokio::time::Instant::now();
        monitor.run(std::future::pending()).await.unwrap();

        // First tick is immediate, then one per period; the sixth tick finds
        // the source exhausted
        assert_eq!(begin.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_no_face_clears_ratio() {
        let mut trace = faces(&[0.3]);
        trace.push(None);
        let (mut monitor, _recorder, status) = monitor(trace, 3);

        monitor.run(std::future::pending()).await.unwrap();

        let status = status.read().await;
        assert_eq!(status.ratio, None);
        assert!(!status.face_detected);
    }

    /// Replays a trace, then fails every later frame
    struct FailingProvider {
        inner: ReplayProvider,
        fail_after: usize,
        calls: usize,
    }

    impl LandmarkProvider for FailingProvider {
        fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
            self.calls += 1;
            if self.calls > self.fail_after {
                return Err(DmsError::Provider("camera unplugged".into()));
            }
            self.inner.detect(frame)
        }
    }

    #[tokio::test]
    async fn test_alarm_silenced_when_frame_fails() {
        let trace = faces(&[0.1, 0.1, 0.1, 0.1]);
        let camera = CameraConfig {
            max_frames: Some(trace.len() as u64),
            ..Default::default()
        };
        let config = DmsConfig {
            drowsiness: DrowsinessConfig::new(0.27, 1).unwrap(),
            ..Default::default()
        };
        let provider = FailingProvider {
            inner: ReplayProvider::from_records(trace),
            fail_after: 2,
            calls: 0,
        };
        let recorder = RecordingActuator::new();
        let status = SharedStatus::default();
        let mut monitor = Monitor::new(
            SyntheticSource::new(camera).unwrap(),
            DmsModule::new(config, provider).unwrap(),
            recorder.clone(),
            status.clone(),
        );

        let err = monitor.run(std::future::pending()).await.unwrap_err();

        assert!(matches!(err, MonitorError::Dms(DmsError::Provider(_))));
        assert_eq!(recorder.calls(), vec![AlarmCommand::Start, AlarmCommand::Stop]);
        let status = status.read().await;
        assert_eq!(status.frames_processed, 2);
        assert!(!status.alarm_active);
    }
}
