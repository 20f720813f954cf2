use super::facing::FacingMode;
use super::platform::{
    DeviceInfo, DeviceKind, MediaDevices, MediaStream, StreamConstraints, StreamSettings,
    TrackCapabilities, VideoResolution,
};
use crate::error::CameraError;
use crate::frame::{PixelFormat, VideoFrame};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Scripted camera exposed by [`SyntheticPlatform`]
#[derive(Debug, Clone)]
pub struct SyntheticDevice {
    pub device_id: String,
    pub label: String,
    /// Facing reported in stream settings once opened
    pub reported_facing: Option<FacingMode>,
    pub torch: bool,
    pub single_shot_focus: bool,
    pub max_resolution: VideoResolution,
    /// Returned from every open attempt when set
    pub failure: Option<CameraError>,
}

impl SyntheticDevice {
    pub fn new(device_id: &str, label: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            label: label.to_string(),
            reported_facing: None,
            torch: false,
            single_shot_focus: false,
            max_resolution: VideoResolution::Uhd4k,
            failure: None,
        }
    }

    pub fn reports_facing(mut self, facing: FacingMode) -> Self {
        self.reported_facing = Some(facing);
        self
    }

    pub fn with_torch(mut self) -> Self {
        self.torch = true;
        self
    }

    pub fn with_single_shot_focus(mut self) -> Self {
        self.single_shot_focus = true;
        self
    }

    pub fn max_resolution(mut self, resolution: VideoResolution) -> Self {
        self.max_resolution = resolution;
        self
    }

    pub fn failing(mut self, error: CameraError) -> Self {
        self.failure = Some(error);
        self
    }
}

/// In-process camera platform producing generated frames on a timer.
///
/// Used by the CLI when no real platform is wired in, and by tests for
/// failure injection (permission denial, unplugging, track loss).
pub struct SyntheticPlatform {
    devices: RwLock<Vec<SyntheticDevice>>,
    frame_size: (u32, u32),
    frame_interval: Duration,
    open_delay: Duration,
    format: PixelFormat,
    permission_denied: AtomicBool,
    enumerations: AtomicU64,
    open_requests: AtomicU64,
    streams: Mutex<Vec<Arc<SyntheticStream>>>,
}

impl SyntheticPlatform {
    pub fn new(devices: Vec<SyntheticDevice>) -> Self {
        Self {
            devices: RwLock::new(devices),
            frame_size: (64, 48),
            frame_interval: Duration::from_millis(33),
            open_delay: Duration::ZERO,
            format: PixelFormat::Rgba,
            permission_denied: AtomicBool::new(false),
            enumerations: AtomicU64::new(0),
            open_requests: AtomicU64::new(0),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Frames are generated at this size whatever resolution was negotiated
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Time `get_user_media` takes before answering
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn deny_permission(&self, denied: bool) {
        self.permission_denied.store(denied, Ordering::SeqCst);
    }

    pub fn add_device(&self, device: SyntheticDevice) {
        self.devices.write().push(device);
    }

    /// Simulate unplugging: the device disappears and its streams end
    pub fn remove_device(&self, device_id: &str) {
        self.devices.write().retain(|d| d.device_id != device_id);
        for stream in self.streams.lock().iter() {
            if stream.device_id == device_id {
                stream.stop();
            }
        }
        info!("Synthetic device {} removed", device_id);
    }

    /// End every open track as if the hardware went away
    pub fn end_all_tracks(&self) {
        for stream in self.streams.lock().iter() {
            stream.stop();
        }
    }

    /// Device ids with a live stream, in open order
    pub fn live_devices(&self) -> Vec<String> {
        self.streams
            .lock()
            .iter()
            .filter(|s| s.is_live())
            .map(|s| s.device_id.clone())
            .collect()
    }

    pub fn enumeration_count(&self) -> u64 {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn open_request_count(&self) -> u64 {
        self.open_requests.load(Ordering::SeqCst)
    }

    /// Torch state of the live stream on `device_id`
    pub fn torch_on(&self, device_id: &str) -> bool {
        self.streams
            .lock()
            .iter()
            .any(|s| s.device_id == device_id && s.is_live() && s.torch.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl MediaDevices for SyntheticPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.permission_denied.load(Ordering::SeqCst) {
            return Err(CameraError::PermissionDenied);
        }

        Ok(self
            .devices
            .read()
            .iter()
            .map(|d| DeviceInfo {
                device_id: d.device_id.clone(),
                group_id: String::new(),
                kind: DeviceKind::VideoInput,
                label: d.label.clone(),
            })
            .collect())
    }

    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError> {
        self.open_requests.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.permission_denied.load(Ordering::SeqCst) {
            return Err(CameraError::PermissionDenied);
        }

        let device = self
            .devices
            .read()
            .iter()
            .find(|d| d.device_id == constraints.device_id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceUnavailable {
                device: constraints.device_id.clone(),
            })?;

        if let Some(error) = device.failure {
            return Err(error);
        }

        let (max_width, max_height) = device.max_resolution.dimensions();
        if constraints.width > max_width || constraints.height > max_height {
            return Err(CameraError::Overconstrained {
                device: device.device_id,
                width: constraints.width,
                height: constraints.height,
            });
        }

        let stream = Arc::new(SyntheticStream {
            id: Uuid::new_v4().to_string(),
            device_id: device.device_id.clone(),
            settings: StreamSettings {
                device_id: device.device_id,
                width: constraints.width,
                height: constraints.height,
                facing: device.reported_facing,
            },
            capabilities: TrackCapabilities {
                torch: device.torch,
                single_shot_focus: device.single_shot_focus,
                max_width,
                max_height,
            },
            frame_size: self.frame_size,
            frame_interval: self.frame_interval,
            format: self.format,
            live: AtomicBool::new(true),
            torch: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        });

        debug!(
            "Synthetic stream {} opened on {} at {}x{}",
            stream.id, stream.device_id, constraints.width, constraints.height
        );
        self.streams.lock().push(Arc::clone(&stream));
        Ok(stream)
    }
}

struct SyntheticStream {
    id: String,
    device_id: String,
    settings: StreamSettings,
    capabilities: TrackCapabilities,
    frame_size: (u32, u32),
    frame_interval: Duration,
    format: PixelFormat,
    live: AtomicBool,
    torch: AtomicBool,
    frames: AtomicU64,
}

impl SyntheticStream {
    fn ended(&self) -> CameraError {
        CameraError::TrackEnded {
            device: self.device_id.clone(),
        }
    }

    /// Diagonal gradient that scrolls one pixel per frame
    fn render(&self, frame_id: u64) -> Vec<u8> {
        let (width, height) = self.frame_size;
        let shift = frame_id as u32;
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let v = (x.wrapping_add(y).wrapping_add(shift) & 0xff) as u8;
                data.extend_from_slice(&[v, v / 2, 255 - v, 255]);
            }
        }
        data
    }
}

#[async_trait]
impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> StreamSettings {
        self.settings.clone()
    }

    fn capabilities(&self) -> TrackCapabilities {
        self.capabilities
    }

    async fn set_torch(&self, on: bool) -> Result<(), CameraError> {
        if !self.is_live() {
            return Err(self.ended());
        }
        self.torch.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Synthetic stream {} stopped", self.id);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn next_frame(&self) -> Result<VideoFrame, CameraError> {
        if !self.is_live() {
            return Err(self.ended());
        }
        tokio::time::sleep(self.frame_interval).await;
        if !self.is_live() {
            return Err(self.ended());
        }

        let frame_id = self.frames.fetch_add(1, Ordering::SeqCst);
        let (width, height) = self.frame_size;
        trace!("Synthetic frame {} on {}", frame_id, self.device_id);
        Ok(VideoFrame::new(
            frame_id,
            SystemTime::now(),
            self.render(frame_id),
            width,
            height,
            self.format,
        ))
    }
}
