//! Video frame types

use image::RgbImage;

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a black frame of the given size
    pub fn blank(width: u32, height: u32, timestamp_ns: u64, sequence: u64) -> Self {
        let len = width as usize * height as usize * 3;
        Self::new(vec![0; len], width, height, timestamp_ns, sequence)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Copy the frame into an `image` buffer for drawing and encoding
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "buffer of {} bytes does not match {}x{} RGB",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }
}
