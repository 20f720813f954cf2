use super::facing::{facing_from_label, FacingMode};
use super::platform::{
    DeviceInfo, MediaDevices, MediaStream, StreamConstraints, TrackCapabilities, VideoResolution,
};
use crate::callbacks::{CallbackSet, Subscription};
use crate::error::CameraError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mutations of a [`Camera`] reported to its observers
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    StreamStarted {
        resolution: VideoResolution,
        width: u32,
        height: u32,
    },
    StreamStopped,
    TorchChanged(bool),
    FacingCorrected(FacingMode),
}

struct CameraState {
    facing: FacingMode,
    stream: Option<Arc<dyn MediaStream>>,
    resolution: Option<VideoResolution>,
    capabilities: TrackCapabilities,
    torch_on: bool,
}

/// A physical camera and the stream currently open on it, if any
pub struct Camera {
    device_id: String,
    name: String,
    devices: Arc<dyn MediaDevices>,
    state: RwLock<CameraState>,
    observers: CallbackSet<CameraEvent>,
}

impl Camera {
    /// Facing is guessed from the label until a stream reports otherwise
    pub fn new(info: &DeviceInfo, devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            device_id: info.device_id.clone(),
            name: info.label.clone(),
            devices,
            state: RwLock::new(CameraState {
                facing: facing_from_label(&info.label),
                stream: None,
                resolution: None,
                capabilities: TrackCapabilities::default(),
                torch_on: false,
            }),
            observers: CallbackSet::new("camera"),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn facing(&self) -> FacingMode {
        self.state.read().facing
    }

    /// Capabilities of the last opened stream
    pub fn capabilities(&self) -> TrackCapabilities {
        self.state.read().capabilities
    }

    pub fn active_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.state
            .read()
            .stream
            .as_ref()
            .filter(|s| s.is_live())
            .cloned()
    }

    pub fn is_streaming(&self) -> bool {
        self.active_stream().is_some()
    }

    pub fn resolution(&self) -> Option<VideoResolution> {
        self.state.read().resolution
    }

    pub fn torch_on(&self) -> bool {
        self.state.read().torch_on
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CameraEvent) + Send + Sync + 'static,
    {
        self.observers.add(callback)
    }

    /// Open a stream, stepping down the resolution ladder while the device
    /// rejects the request as overconstrained. Returns the live stream if one
    /// is already open.
    pub async fn start_stream(
        &self,
        resolution: VideoResolution,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        if let Some(stream) = self.active_stream() {
            debug!("Camera {} already streaming", self.name);
            return Ok(stream);
        }

        let mut last_error = CameraError::DeviceUnavailable {
            device: self.device_id.clone(),
        };

        for candidate in resolution.fallback_ladder() {
            let constraints = StreamConstraints::new(&self.device_id, candidate);
            match self.devices.get_user_media(&constraints).await {
                Ok(stream) => {
                    self.adopt_stream(Arc::clone(&stream), candidate);
                    return Ok(stream);
                }
                Err(e @ CameraError::Overconstrained { .. }) => {
                    debug!("Camera {} rejected {}: {}", self.name, candidate, e);
                    last_error = e;
                }
                Err(e) => {
                    warn!("Failed to open camera {}: {}", self.name, e);
                    return Err(e);
                }
            }
        }

        warn!(
            "Camera {} supports none of the resolutions up to {}",
            self.name, resolution
        );
        Err(last_error)
    }

    fn adopt_stream(&self, stream: Arc<dyn MediaStream>, resolution: VideoResolution) {
        let settings = stream.settings();
        let capabilities = stream.capabilities();

        let corrected = {
            let mut state = self.state.write();
            state.stream = Some(stream);
            state.resolution = Some(resolution);
            state.capabilities = capabilities;
            state.torch_on = false;

            // Stream settings are authoritative over the label guess
            match settings.facing {
                Some(facing) if facing != state.facing => {
                    state.facing = facing;
                    Some(facing)
                }
                _ => None,
            }
        };

        info!(
            "Camera {} streaming at {}x{} (requested {})",
            self.name, settings.width, settings.height, resolution
        );

        if let Some(facing) = corrected {
            debug!("Camera {} facing corrected to {}", self.name, facing);
            self.observers.emit(&CameraEvent::FacingCorrected(facing));
        }
        self.observers.emit(&CameraEvent::StreamStarted {
            resolution,
            width: settings.width,
            height: settings.height,
        });
    }

    /// Stop and forget the current stream
    pub fn stop_stream(&self) {
        let stream = {
            let mut state = self.state.write();
            state.torch_on = false;
            state.resolution = None;
            state.stream.take()
        };

        if let Some(stream) = stream {
            stream.stop();
            debug!("Camera {} stream stopped", self.name);
            self.observers.emit(&CameraEvent::StreamStopped);
        }
    }

    /// Flip the torch. Fails when nothing is streaming or the track has no torch.
    pub async fn toggle_torch(&self) -> Result<bool, CameraError> {
        let stream = self.active_stream().ok_or(CameraError::NoCameraSelected)?;
        if !stream.capabilities().torch {
            return Err(CameraError::Platform {
                details: format!("Camera {} has no torch", self.name),
            });
        }

        let on = !self.torch_on();
        stream.set_torch(on).await?;
        self.state.write().torch_on = on;
        info!("Camera {} torch {}", self.name, if on { "on" } else { "off" });
        self.observers.emit(&CameraEvent::TorchChanged(on));
        Ok(on)
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("device_id", &self.device_id)
            .field("name", &self.name)
            .field("facing", &self.facing())
            .field("streaming", &self.is_streaming())
            .finish()
    }
}
