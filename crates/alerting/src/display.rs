//! Display overlay and sinks

use std::fs;
use std::path::{Path, PathBuf};

use camera_capture::VideoFrame;
use dms::{DmsAnalysis, EyeLandmarks};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use crate::AlertError;

const ALERT_BANNER: &str = "DROWSINESS ALERT!";
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Read-only view of the pipeline state drawn over a frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub sequence: u64,
    /// Averaged openness ratio, if a face was seen
    pub ratio: Option<f32>,
    pub alarm_active: bool,
    pub face_detected: bool,
    /// Eye points in pixel space, left then right
    pub eyes: Option<[EyeLandmarks; 2]>,
}

impl Overlay {
    pub fn from_analysis(analysis: &DmsAnalysis) -> Self {
        Self {
            sequence: analysis.sequence,
            ratio: analysis.average_ratio(),
            alarm_active: analysis.alarm_active,
            face_detected: analysis.face_detected,
            eyes: analysis.eyes,
        }
    }

    /// Numeric readout, e.g. `EAR: 0.23`
    pub fn ratio_text(&self) -> Option<String> {
        self.ratio.map(|r| format!("EAR: {:.2}", r))
    }

    /// Warning banner while the alarm is on
    pub fn banner(&self) -> Option<&'static str> {
        self.alarm_active.then_some(ALERT_BANNER)
    }
}

/// Renders a frame with its overlay
pub trait DisplaySink: Send {
    fn render(&mut self, frame: &VideoFrame, overlay: &Overlay) -> Result<(), AlertError>;
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn render(&mut self, frame: &VideoFrame, overlay: &Overlay) -> Result<(), AlertError> {
        (**self).render(frame, overlay)
    }
}

/// Writes the overlay text to the log
#[derive(Debug, Default)]
pub struct LogDisplay {
    banner_shown: bool,
}

impl DisplaySink for LogDisplay {
    fn render(&mut self, frame: &VideoFrame, overlay: &Overlay) -> Result<(), AlertError> {
        match overlay.ratio_text() {
            Some(text) => debug!("[frame {}] {}", frame.sequence, text),
            None => debug!("[frame {}] no face", frame.sequence),
        }

        match (overlay.banner(), self.banner_shown) {
            (Some(banner), false) => {
                warn!("[frame {}] {}", frame.sequence, banner);
                self.banner_shown = true;
            }
            (None, true) => {
                info!("[frame {}] alert banner cleared", frame.sequence);
                self.banner_shown = false;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Draws eye markers, a ratio gauge and the alert banner onto frames and
/// saves every `every_n`th frame as PNG.
pub struct SnapshotDisplay {
    dir: PathBuf,
    every_n: u64,
    saved: u64,
}

impl SnapshotDisplay {
    pub fn new(dir: impl AsRef<Path>, every_n: u64) -> Result<Self, AlertError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Saving overlay snapshots to {} (every {} frames)", dir.display(), every_n.max(1));
        Ok(Self {
            dir,
            every_n: every_n.max(1),
            saved: 0,
        })
    }

    pub fn saved(&self) -> u64 {
        self.saved
    }

    fn snapshot_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", sequence))
    }
}

/// Draw the overlay onto an RGB image
fn draw_overlay(img: &mut RgbImage, overlay: &Overlay) {
    let (width, height) = img.dimensions();

    if let Some(eyes) = &overlay.eyes {
        for p in eyes.iter().flat_map(|eye| eye.points().iter()) {
            draw_filled_circle_mut(img, (p.x.round() as i32, p.y.round() as i32), 2, GREEN);
        }
    }

    // Ratio gauge along the bottom edge; full width at 0.5
    if let Some(ratio) = overlay.ratio {
        let gauge_h = (height / 40).max(2).min(height);
        let gauge_w = ((ratio / 0.5).clamp(0.0, 1.0) * width as f32) as u32;
        if gauge_w > 0 {
            let color = if overlay.alarm_active { RED } else { WHITE };
            draw_filled_rect_mut(
                img,
                Rect::at(0, (height - gauge_h) as i32).of_size(gauge_w, gauge_h),
                color,
            );
        }
    }

    if overlay.alarm_active {
        let banner_h = (height / 10).max(4);
        draw_filled_rect_mut(img, Rect::at(0, 0).of_size(width, banner_h), RED);
        draw_hollow_rect_mut(img, Rect::at(0, 0).of_size(width, height), RED);
    }
}

impl DisplaySink for SnapshotDisplay {
    fn render(&mut self, frame: &VideoFrame, overlay: &Overlay) -> Result<(), AlertError> {
        if frame.sequence % self.every_n != 0 {
            return Ok(());
        }

        let mut img = frame.to_rgb_image()?;
        draw_overlay(&mut img, overlay);

        let path = self.snapshot_path(frame.sequence);
        img.save(&path)?;
        self.saved += 1;
        debug!("Saved snapshot {}", path.display());
        Ok(())
    }
}
