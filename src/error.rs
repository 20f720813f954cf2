use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Scan timed out after {after:?}")]
    ScanTimeout { after: Duration },

    #[error("Unsupported document: {details}")]
    UnsupportedDocument { details: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl DocscanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Hardware, permission and timeout failures may be retried by the caller.
    /// Buffer protocol violations are programming errors and never are.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DocscanError::Camera(e) => e.is_recoverable(),
            DocscanError::Engine(_) => true,
            DocscanError::ScanTimeout { .. } => true,
            DocscanError::UnsupportedDocument { .. } => true,
            DocscanError::Render(_) => true,
            DocscanError::Buffer(_) => false,
            DocscanError::Config(_) => false,
            DocscanError::Json(_) => false,
            DocscanError::Io(_) => true,
            DocscanError::System { .. } => false,
            DocscanError::Component { .. } => true,
        }
    }
}

/// Camera platform and stream control errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera device {device} is unavailable")]
    DeviceUnavailable { device: String },

    #[error("Video track of {device} ended")]
    TrackEnded { device: String },

    #[error("Resolution {width}x{height} not supported by {device}")]
    Overconstrained {
        device: String,
        width: u32,
        height: u32,
    },

    #[error("No cameras available")]
    NoCameras,

    #[error("No camera selected")]
    NoCameraSelected,

    #[error("Camera swap already in progress")]
    SwapInProgress,

    #[error("Camera platform error: {details}")]
    Platform { details: String },
}

impl CameraError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CameraError::SwapInProgress)
    }
}

/// Errors reported by the recognition engine boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine processing failed: {details}")]
    Processing { details: String },

    #[error("Engine unavailable: {details}")]
    Unavailable { details: String },

    #[error("Final result requested before the document was scanned")]
    ResultNotReady,
}

/// Frame buffer ownership protocol violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Reattached buffer is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Frame rendering errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to create render context: {details}")]
    ContextCreation { details: String },

    #[error("Extraction area {x},{y} {width}x{height} exceeds frame {frame_width}x{frame_height}")]
    AreaOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("Frame data is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, DocscanError>;
