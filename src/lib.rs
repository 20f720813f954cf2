pub mod callbacks;
pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod ui_state;
pub mod ux;

pub use callbacks::{CallbackSet, Subscription};
pub use camera::{
    find_ideal_camera, Camera, CameraStreamController, CameraStreamControllerBuilder,
    ControllerSettings, FacingMode, MediaDevices, MediaStream, PlaybackState, SyntheticDevice,
    SyntheticPlatform, VideoResolution,
};
pub use config::DocscanConfig;
pub use engine::{AnalysisResult, FinalResult, ProcessOutcome, RecognitionEngine, ReplayEngine};
pub use error::{BufferError, CameraError, DocscanError, EngineError, RenderError, Result};
pub use extractor::{BufferLease, FrameExtractor, RenderPath};
pub use frame::{ExtractionArea, ImageData, PixelFormat, VideoFrame};
pub use ui_state::{
    classify, default_descriptors, ClassifierSettings, FeedbackStabilizer, StabilizerOptions,
    UiStateDescriptor, UiStateKey,
};
pub use ux::{DocumentFilter, ScanOutcome, UiStateChange, UxManager, UxSettings, Watchdog};
