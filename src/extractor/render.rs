use crate::error::RenderError;
use crate::frame::{ExtractionArea, PixelFormat, VideoFrame};
use image::{imageops, GenericImage, ImageBuffer, Rgba, RgbaImage};
use tracing::debug;

/// Which pipeline produced the pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    Accelerated,
    Canvas2d,
}

/// Off-screen surface the extractor draws a frame region into and reads
/// RGBA pixels back from.
pub trait RenderContext: Send {
    fn path(&self) -> RenderPath;

    /// Current surface size
    fn size(&self) -> (u32, u32);

    /// Reallocate the surface. Callers only invoke this on an actual change.
    fn resize(&mut self, width: u32, height: u32);

    /// Draw `area` of `frame` and read it into `out` as RGBA.
    /// `out` is exactly `area.width * area.height * 4` bytes.
    fn render(
        &mut self,
        frame: &VideoFrame,
        area: &ExtractionArea,
        out: &mut [u8],
    ) -> Result<(), RenderError>;
}

/// Creates the preferred render context. Failure makes the extractor fall
/// back to [`Canvas2dContext`].
pub trait ContextProvider: Send + Sync {
    fn create_accelerated(&self) -> Result<Box<dyn RenderContext>, RenderError>;
}

/// Provider for the in-process accelerated path
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContextProvider;

impl ContextProvider for DefaultContextProvider {
    fn create_accelerated(&self) -> Result<Box<dyn RenderContext>, RenderError> {
        Ok(Box::new(AcceleratedContext::new()))
    }
}

fn swizzle_to_rgba(format: PixelFormat, pixels: &mut [u8]) {
    if format.needs_swizzle() {
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }
}

/// Fast path: copies the area row by row into a texture-sized framebuffer,
/// converting channel order on the way, then reads the framebuffer back.
pub struct AcceleratedContext {
    width: u32,
    height: u32,
    framebuffer: Vec<u8>,
}

impl AcceleratedContext {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            framebuffer: Vec::new(),
        }
    }
}

impl Default for AcceleratedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for AcceleratedContext {
    fn path(&self) -> RenderPath {
        RenderPath::Accelerated
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!("Accelerated surface resized to {}x{}", width, height);
        self.width = width;
        self.height = height;
        self.framebuffer = vec![0u8; width as usize * height as usize * 4];
    }

    fn render(
        &mut self,
        frame: &VideoFrame,
        area: &ExtractionArea,
        out: &mut [u8],
    ) -> Result<(), RenderError> {
        let stride = frame.width as usize * 4;
        let row_len = area.width as usize * 4;

        for (row, dst) in self.framebuffer.chunks_exact_mut(row_len).enumerate() {
            let start = (area.y as usize + row) * stride + area.x as usize * 4;
            dst.copy_from_slice(&frame.data[start..start + row_len]);
        }
        swizzle_to_rgba(frame.format, &mut self.framebuffer);

        if out.len() != self.framebuffer.len() {
            return Err(RenderError::FrameSize {
                expected: self.framebuffer.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(&self.framebuffer);
        Ok(())
    }
}

/// Fallback path built on `image` buffers
pub struct Canvas2dContext {
    canvas: RgbaImage,
}

impl Canvas2dContext {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
        }
    }
}

impl Default for Canvas2dContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for Canvas2dContext {
    fn path(&self) -> RenderPath {
        RenderPath::Canvas2d
    }

    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!("2D canvas resized to {}x{}", width, height);
        self.canvas = RgbaImage::new(width, height);
    }

    fn render(
        &mut self,
        frame: &VideoFrame,
        area: &ExtractionArea,
        out: &mut [u8],
    ) -> Result<(), RenderError> {
        let source: ImageBuffer<Rgba<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.as_slice()).ok_or(
                RenderError::FrameSize {
                    expected: frame.expected_size(),
                    actual: frame.data.len(),
                },
            )?;

        let region = imageops::crop_imm(&source, area.x, area.y, area.width, area.height);
        self.canvas
            .copy_from(&*region, 0, 0)
            .map_err(|_| RenderError::AreaOutOfBounds {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height,
                frame_width: frame.width,
                frame_height: frame.height,
            })?;

        let pixels: &[u8] = self.canvas.as_raw();
        if out.len() != pixels.len() {
            return Err(RenderError::FrameSize {
                expected: pixels.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(pixels);
        swizzle_to_rgba(frame.format, out);
        Ok(())
    }
}
