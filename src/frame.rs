use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of frames delivered by a camera stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit red, green, blue, alpha
    Rgba,
    /// 8-bit blue, green, red, alpha
    Bgra,
}

impl PixelFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Whether red and blue must be swapped to produce RGBA
    pub fn needs_swizzle(&self) -> bool {
        matches!(self, PixelFormat::Bgra)
    }
}

/// A decoded frame as delivered by the live video source
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw pixel data (shared ownership, never mutated)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Expected byte length for the frame dimensions
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// RGBA pixels extracted from a video frame, `width * height * 4` bytes.
///
/// The backing `Vec` is moved, not copied, when handed to the recognition
/// engine; whoever holds an `ImageData` owns its buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Give up the pixel buffer, typically to reattach it to the extractor
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Region of a video frame to extract, in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ExtractionArea {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Visible part of a `video` sized frame rendered with object-fit: cover
    /// into a `viewport` sized element. The frame is scaled to fill the
    /// viewport and centered, so only the returned crop is on screen.
    pub fn cover(video: (u32, u32), viewport: (u32, u32)) -> Self {
        let (vw, vh) = video;
        let (pw, ph) = viewport;
        if vw == 0 || vh == 0 || pw == 0 || ph == 0 {
            return Self::full(vw, vh);
        }

        let video_ratio = vw as f64 / vh as f64;
        let view_ratio = pw as f64 / ph as f64;

        if video_ratio > view_ratio {
            // Frame is wider than the viewport: sides are cut off
            let width = ((vh as f64 * view_ratio).round() as u32).clamp(1, vw);
            Self {
                x: (vw - width) / 2,
                y: 0,
                width,
                height: vh,
            }
        } else {
            let height = ((vw as f64 / view_ratio).round() as u32).clamp(1, vh);
            Self {
                x: 0,
                y: (vh - height) / 2,
                width: vw,
                height,
            }
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= width
            && self.y.saturating_add(self.height) <= height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_validation() {
        let frame = VideoFrame::new(
            1,
            SystemTime::now(),
            vec![0u8; 64 * 48 * 4],
            64,
            48,
            PixelFormat::Rgba,
        );
        assert!(frame.validate_size());

        let short = VideoFrame::new(2, SystemTime::now(), vec![0u8; 10], 64, 48, PixelFormat::Bgra);
        assert!(!short.validate_size());
    }

    #[test]
    fn test_cover_crops_wide_video_for_portrait_viewport() {
        // 16:9 landscape video shown in a square viewport
        let area = ExtractionArea::cover((1920, 1080), (500, 500));
        assert_eq!(area.height, 1080);
        assert_eq!(area.width, 1080);
        assert_eq!(area.x, 420);
        assert_eq!(area.y, 0);
        assert!(area.fits_within(1920, 1080));
    }

    #[test]
    fn test_cover_crops_tall_video_for_wide_viewport() {
        let area = ExtractionArea::cover((720, 1280), (1280, 720));
        assert_eq!(area.width, 720);
        assert_eq!(area.height, 405);
        assert_eq!(area.y, (1280 - 405) / 2);
    }

    #[test]
    fn test_cover_same_ratio_is_full_frame() {
        let area = ExtractionArea::cover((1280, 720), (640, 360));
        assert_eq!(area, ExtractionArea::full(1280, 720));
    }

    #[test]
    fn test_image_data_byte_len() {
        assert_eq!(ImageData::byte_len(4, 2), 32);
        let image = ImageData::new(4, 2, vec![0; 32]);
        assert_eq!(image.into_data().len(), 32);
    }
}
