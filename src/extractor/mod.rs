//! Pixel extraction from live video frames.
//!
//! The extractor draws the visible region of a frame into an off-screen
//! surface and reads it back into a leased buffer. The buffer is moved into
//! the returned [`ImageData`]; the recognition engine hands it back and the
//! caller reattaches it with [`FrameExtractor::reattach_buffer`].

mod lease;
mod render;

pub use lease::BufferLease;
pub use render::{
    AcceleratedContext, Canvas2dContext, ContextProvider, DefaultContextProvider, RenderContext,
    RenderPath,
};

use crate::error::{BufferError, RenderError};
use crate::frame::{ExtractionArea, ImageData, VideoFrame};
use tracing::{debug, trace, warn};

pub struct FrameExtractor {
    context: Box<dyn RenderContext>,
    lease: BufferLease,
    resize_count: u64,
}

impl FrameExtractor {
    /// Use the provider's accelerated context, falling back to the 2D path
    /// when it cannot be created.
    pub fn new(provider: &dyn ContextProvider) -> Self {
        let context = match provider.create_accelerated() {
            Ok(context) => {
                debug!("Frame extractor using accelerated render path");
                context
            }
            Err(e) => {
                warn!("Accelerated context unavailable, using 2D canvas: {}", e);
                Box::new(Canvas2dContext::new()) as Box<dyn RenderContext>
            }
        };

        Self {
            context,
            lease: BufferLease::new(),
            resize_count: 0,
        }
    }

    pub fn with_context(context: Box<dyn RenderContext>) -> Self {
        Self {
            context,
            lease: BufferLease::new(),
            resize_count: 0,
        }
    }

    pub fn render_path(&self) -> RenderPath {
        self.context.path()
    }

    /// Extract `area` (whole frame when `None`) as RGBA pixels
    pub fn get_image_data(
        &mut self,
        frame: &VideoFrame,
        area: Option<ExtractionArea>,
    ) -> Result<ImageData, RenderError> {
        if !frame.validate_size() {
            return Err(RenderError::FrameSize {
                expected: frame.expected_size(),
                actual: frame.data.len(),
            });
        }

        let area = area.unwrap_or_else(|| ExtractionArea::full(frame.width, frame.height));
        if !area.fits_within(frame.width, frame.height) {
            return Err(RenderError::AreaOutOfBounds {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height,
                frame_width: frame.width,
                frame_height: frame.height,
            });
        }

        if self.context.size() != (area.width, area.height) {
            self.context.resize(area.width, area.height);
            self.resize_count += 1;
        }

        let mut buffer = self
            .lease
            .checkout(ImageData::byte_len(area.width, area.height));

        if let Err(e) = self.context.render(frame, &area, &mut buffer) {
            // Same length as checked out, so the lease accepts it
            let _ = self.lease.give_back(buffer);
            return Err(e);
        }

        trace!(
            "Extracted {}x{} from frame {} via {:?}",
            area.width,
            area.height,
            frame.id,
            self.context.path()
        );
        Ok(ImageData::new(area.width, area.height, buffer))
    }

    /// Take back a buffer previously returned inside an [`ImageData`]
    pub fn reattach_buffer(&mut self, buffer: Vec<u8>) -> Result<(), BufferError> {
        self.lease.give_back(buffer)
    }

    /// The last handed-out buffer has not been reattached yet
    pub fn is_buffer_detached(&self) -> bool {
        self.lease.is_detached()
    }

    /// Surface reallocations so far
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    pub fn buffer_allocations(&self) -> u64 {
        self.lease.allocations()
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(&DefaultContextProvider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use std::time::SystemTime;

    struct FailingProvider;

    impl ContextProvider for FailingProvider {
        fn create_accelerated(&self) -> Result<Box<dyn RenderContext>, RenderError> {
            Err(RenderError::ContextCreation {
                details: "no GPU".to_string(),
            })
        }
    }

    /// 4x2 frame where every pixel encodes its own coordinates
    fn gradient_frame(format: PixelFormat) -> VideoFrame {
        let (width, height) = (4u32, 2u32);
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 100 + x as u8, 255]);
            }
        }
        VideoFrame::new(1, SystemTime::now(), data, width, height, format)
    }

    #[test]
    fn test_fallback_to_canvas_on_context_failure() {
        let extractor = FrameExtractor::new(&FailingProvider);
        assert_eq!(extractor.render_path(), RenderPath::Canvas2d);

        let extractor = FrameExtractor::default();
        assert_eq!(extractor.render_path(), RenderPath::Accelerated);
    }

    #[test]
    fn test_both_paths_crop_identically() {
        let frame = gradient_frame(PixelFormat::Rgba);
        let area = ExtractionArea {
            x: 1,
            y: 1,
            width: 2,
            height: 1,
        };

        let mut accelerated = FrameExtractor::default();
        let mut canvas = FrameExtractor::new(&FailingProvider);
        let a = accelerated.get_image_data(&frame, Some(area)).unwrap();
        let b = canvas.get_image_data(&frame, Some(area)).unwrap();

        assert_eq!(a.data, vec![1, 1, 101, 255, 2, 1, 102, 255]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bgra_frames_are_swizzled() {
        let frame = gradient_frame(PixelFormat::Bgra);
        let area = ExtractionArea::full(4, 2);

        for mut extractor in [FrameExtractor::default(), FrameExtractor::new(&FailingProvider)] {
            let image = extractor.get_image_data(&frame, Some(area)).unwrap();
            assert_eq!(&image.data[4..8], &[101, 0, 1, 255]);
        }
    }

    #[test]
    fn test_resize_only_on_dimension_change() {
        let frame = gradient_frame(PixelFormat::Rgba);
        let mut extractor = FrameExtractor::default();

        for _ in 0..3 {
            let image = extractor.get_image_data(&frame, None).unwrap();
            extractor.reattach_buffer(image.into_data()).unwrap();
        }
        assert_eq!(extractor.resize_count(), 1);
        assert_eq!(extractor.buffer_allocations(), 1);

        let area = ExtractionArea::cover((4, 2), (1, 1));
        let image = extractor.get_image_data(&frame, Some(area)).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(extractor.resize_count(), 2);
    }

    #[test]
    fn test_detached_buffer_tracking() {
        let frame = gradient_frame(PixelFormat::Rgba);
        let mut extractor = FrameExtractor::default();

        let held = extractor.get_image_data(&frame, None).unwrap();
        assert!(extractor.is_buffer_detached());

        // Engine still holds the first buffer: a fresh one is allocated
        let second = extractor.get_image_data(&frame, None).unwrap();
        assert_eq!(extractor.buffer_allocations(), 2);

        extractor.reattach_buffer(held.into_data()).unwrap();
        extractor.reattach_buffer(second.into_data()).unwrap();
        assert!(!extractor.is_buffer_detached());
    }

    #[test]
    fn test_reattach_rejects_wrong_size() {
        let frame = gradient_frame(PixelFormat::Rgba);
        let mut extractor = FrameExtractor::default();
        let _held = extractor.get_image_data(&frame, None).unwrap();

        let err = extractor.reattach_buffer(vec![0; 3]).unwrap_err();
        assert_eq!(
            err,
            BufferError::SizeMismatch {
                expected: 32,
                actual: 3
            }
        );
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut extractor = FrameExtractor::default();
        let frame = gradient_frame(PixelFormat::Rgba);
        let outside = ExtractionArea {
            x: 3,
            y: 0,
            width: 2,
            height: 2,
        };
        assert!(matches!(
            extractor.get_image_data(&frame, Some(outside)),
            Err(RenderError::AreaOutOfBounds { .. })
        ));

        let short = VideoFrame::new(2, SystemTime::now(), vec![0; 5], 4, 2, PixelFormat::Rgba);
        assert!(matches!(
            extractor.get_image_data(&short, None),
            Err(RenderError::FrameSize { .. })
        ));
        assert!(!extractor.is_buffer_detached());
    }
}
