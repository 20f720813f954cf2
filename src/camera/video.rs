use super::platform::MediaStream;
use crate::error::CameraError;
use crate::frame::{ExtractionArea, VideoFrame};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct VideoState {
    stream: Option<Arc<dyn MediaStream>>,
    playing: bool,
    mirror_x: bool,
    view_size: Option<(u32, u32)>,
}

/// Playback sink a stream is attached to. Frames are only pulled while
/// playing, and the on-screen viewport decides which part of each frame
/// is visible.
#[derive(Default)]
pub struct VideoElement {
    state: RwLock<VideoState>,
}

impl VideoElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, stream: Arc<dyn MediaStream>) {
        debug!("Video element source set to stream {}", stream.id());
        let mut state = self.state.write();
        state.stream = Some(stream);
        state.playing = false;
    }

    /// Clear the source without stopping the stream
    pub fn detach(&self) {
        let mut state = self.state.write();
        state.stream = None;
        state.playing = false;
    }

    pub fn has_source(&self) -> bool {
        self.state.read().stream.is_some()
    }

    pub fn play(&self) -> Result<(), CameraError> {
        let mut state = self.state.write();
        if state.stream.is_none() {
            return Err(CameraError::NoCameraSelected);
        }
        state.playing = true;
        Ok(())
    }

    pub fn pause(&self) {
        self.state.write().playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.state.read().playing
    }

    pub fn set_mirror_x(&self, mirror: bool) {
        self.state.write().mirror_x = mirror;
    }

    pub fn mirror_x(&self) -> bool {
        self.state.read().mirror_x
    }

    /// Size of the element on screen; `None` shows the whole frame
    pub fn set_view_size(&self, size: Option<(u32, u32)>) {
        self.state.write().view_size = size;
    }

    /// Part of a frame of the given size that is actually visible
    pub fn visible_area(&self, width: u32, height: u32) -> ExtractionArea {
        match self.state.read().view_size {
            Some(view) => ExtractionArea::cover((width, height), view),
            None => ExtractionArea::full(width, height),
        }
    }

    /// Wait for the next frame of the attached stream
    pub async fn next_frame(&self) -> Result<VideoFrame, CameraError> {
        let stream = {
            let state = self.state.read();
            if !state.playing {
                return Err(CameraError::Platform {
                    details: "video element is paused".to_string(),
                });
            }
            state.stream.clone().ok_or(CameraError::NoCameraSelected)?
        };
        stream.next_frame().await
    }
}
