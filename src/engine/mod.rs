mod replay;
mod result;

pub use replay::ReplayEngine;
pub use result::{
    AnalysisResult, DetectionState, DocumentClassInfo, FinalResult, FramingStatus,
    LightingStatus, ProcessingStatus, ScanningSide, ScanningStatus,
};

use crate::error::EngineError;
use crate::frame::ImageData;
use async_trait::async_trait;

/// What the engine hands back for one frame: the analysis and, when the
/// engine is done with it, the pixel buffer that was transferred in.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub result: AnalysisResult,
    pub image: Option<ImageData>,
}

/// Boundary to the opaque document recognition engine.
///
/// `process` takes ownership of the frame; the buffer comes back in
/// [`ProcessOutcome::image`] so it can be reattached to the extractor.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn process(&self, image: ImageData) -> Result<ProcessOutcome, EngineError>;

    async fn get_result(&self) -> Result<FinalResult, EngineError>;

    async fn reset(&self) -> Result<(), EngineError>;
}
