//! Landmark providers

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use camera_capture::VideoFrame;
use serde::Deserialize;
use tracing::{debug, info};

use crate::landmarks::{CoordinateSpace, FaceLandmarks, Point2D};
use crate::DmsError;

/// Source of facial landmarks for a frame.
///
/// Returns `Ok(None)` when no face is found.
pub trait LandmarkProvider {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError>;
}

/// One line of a landmark trace
#[derive(Debug, Deserialize)]
struct TraceRecord {
    /// `null` when the tracker lost the face
    landmarks: Option<Vec<[f32; 2]>>,
    #[serde(default)]
    space: CoordinateSpace,
}

impl From<TraceRecord> for Option<FaceLandmarks> {
    fn from(record: TraceRecord) -> Self {
        record.landmarks.map(|points| {
            FaceLandmarks::new(points.into_iter().map(Point2D::from).collect(), record.space)
        })
    }
}

/// Replays landmarks recorded from a face tracker, one record per frame.
///
/// The trace is JSON lines:
/// `{"landmarks": [[x, y], ...], "space": "normalized"}` or
/// `{"landmarks": null}` for frames without a face. Once the trace is
/// exhausted every further frame reports no face.
pub struct ReplayProvider {
    records: VecDeque<Option<FaceLandmarks>>,
    exhausted_logged: bool,
}

impl ReplayProvider {
    pub fn from_records(records: impl IntoIterator<Item = Option<FaceLandmarks>>) -> Self {
        Self {
            records: records.into_iter().collect(),
            exhausted_logged: false,
        }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, DmsError> {
        let mut records = VecDeque::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| DmsError::Provider(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: TraceRecord = serde_json::from_str(line)
                .map_err(|e| DmsError::Provider(format!("trace line {}: {}", line_no + 1, e)))?;
            records.push_back(record.into());
        }
        Ok(Self {
            records,
            exhausted_logged: false,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DmsError::Provider(format!("{}: {}", path.display(), e)))?;
        let provider = Self::from_reader(BufReader::new(file))?;
        info!(
            "Loaded landmark trace {} ({} frames)",
            path.display(),
            provider.remaining()
        );
        Ok(provider)
    }

    /// Frames left in the trace
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl LandmarkProvider for ReplayProvider {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
        match self.records.pop_front() {
            Some(record) => Ok(record),
            None => {
                if !self.exhausted_logged {
                    debug!("Landmark trace exhausted at frame {}", frame.sequence);
                    self.exhausted_logged = true;
                }
                Ok(None)
            }
        }
    }
}
