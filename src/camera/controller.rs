use super::device::Camera;
use super::facing::FacingMode;
use super::platform::{DeviceKind, MediaDevices, MediaStream, VideoResolution};
use super::selector::find_ideal_camera;
use super::store::{PlaybackState, StreamStore};
use super::video::VideoElement;
use crate::callbacks::{CallbackSet, Subscription};
use crate::error::{BufferError, CameraError, DocscanError, Result};
use crate::extractor::{ContextProvider, DefaultContextProvider, FrameExtractor, RenderPath};
use crate::frame::{ImageData, VideoFrame};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Stream controller tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub resolution: VideoResolution,
    pub facing: FacingMode,
    /// Start playback as soon as a stream is attached
    pub auto_start_playback: bool,
    pub mirror_front_camera: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            resolution: VideoResolution::Uhd4k,
            facing: FacingMode::Back,
            auto_start_playback: true,
            mirror_front_camera: true,
        }
    }
}

/// Receives every extracted frame while capturing.
///
/// The consumer owns the image; its buffer has to come back through
/// [`BufferReturn::reattach`] once the consumer is done with it.
pub trait FrameConsumer: Send + Sync {
    fn on_frame(&self, image: ImageData, buffers: BufferReturn);
}

/// Handle for giving a frame buffer back to the controller's extractor
#[derive(Clone)]
pub struct BufferReturn {
    extractor: Arc<Mutex<FrameExtractor>>,
}

impl BufferReturn {
    pub fn reattach(&self, buffer: Vec<u8>) -> std::result::Result<(), BufferError> {
        self.extractor.lock().reattach_buffer(buffer)
    }

    pub fn is_detached(&self) -> bool {
        self.extractor.lock().is_buffer_detached()
    }
}

struct FrameTask {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

struct ControllerInner {
    devices: Arc<dyn MediaDevices>,
    settings: RwLock<ControllerSettings>,
    store: StreamStore,
    video: VideoElement,
    extractor: Arc<Mutex<FrameExtractor>>,
    frame_task: Mutex<Option<FrameTask>>,
    consumer: RwLock<Option<Arc<dyn FrameConsumer>>>,
    frame_callbacks: CallbackSet<ImageData>,
    error_callbacks: CallbackSet<CameraError>,
    abort_requested: AtomicBool,
    frames_delivered: AtomicU64,
}

impl ControllerInner {
    fn report(&self, error: &CameraError) {
        self.store.update(|s| s.error = Some(error.clone()));
        self.error_callbacks.emit(error);
    }

    fn cancel_frame_loop(&self) {
        if let Some(task) = self.frame_task.lock().take() {
            task.token.cancel();
            debug!("Frame capture loop cancelled");
        }
    }

    async fn run_frame_loop(self: Arc<Self>, token: CancellationToken) {
        info!("Frame capture loop started");
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                frame = self.video.next_frame() => frame,
            };

            match frame {
                Ok(frame) => self.deliver(frame),
                Err(e) => {
                    if token.is_cancelled() {
                        break;
                    }
                    error!("Frame capture stopped: {}", e);
                    self.frame_task.lock().take();
                    self.video.pause();
                    self.store.update(|s| s.playback_state = PlaybackState::Idle);
                    self.report(&e);
                    break;
                }
            }
        }
        info!("Frame capture loop stopped");
    }

    fn deliver(&self, frame: VideoFrame) {
        let area = self.video.visible_area(frame.width, frame.height);
        let extracted = self.extractor.lock().get_image_data(&frame, Some(area));
        let image = match extracted {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping frame {}: {}", frame.id, e);
                return;
            }
        };

        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
        trace!("Delivering frame {} ({}x{})", frame.id, image.width, image.height);
        self.frame_callbacks.emit(&image);

        let consumer = self.consumer.read().clone();
        match consumer {
            Some(consumer) => consumer.on_frame(
                image,
                BufferReturn {
                    extractor: Arc::clone(&self.extractor),
                },
            ),
            None => {
                if let Err(e) = self.extractor.lock().reattach_buffer(image.into_data()) {
                    error!("Failed to reattach unconsumed frame buffer: {}", e);
                }
            }
        }
    }
}

/// Owns the camera stream lifecycle and the per-frame capture loop.
///
/// State lives in a [`StreamStore`] observers can subscribe to. Cloning
/// the controller yields another handle to the same camera.
#[derive(Clone)]
pub struct CameraStreamController {
    inner: Arc<ControllerInner>,
}

impl CameraStreamController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        settings: ControllerSettings,
        provider: &dyn ContextProvider,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                devices,
                settings: RwLock::new(settings),
                store: StreamStore::new(),
                video: VideoElement::new(),
                extractor: Arc::new(Mutex::new(FrameExtractor::new(provider))),
                frame_task: Mutex::new(None),
                consumer: RwLock::new(None),
                frame_callbacks: CallbackSet::new("frame"),
                error_callbacks: CallbackSet::new("camera_error"),
                abort_requested: AtomicBool::new(false),
                frames_delivered: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &StreamStore {
        &self.inner.store
    }

    pub fn video(&self) -> &VideoElement {
        &self.inner.video
    }

    pub fn settings(&self) -> ControllerSettings {
        *self.inner.settings.read()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.inner.store.playback_state()
    }

    pub fn selected_camera(&self) -> Option<Arc<Camera>> {
        self.inner.store.selected_camera()
    }

    pub fn render_path(&self) -> RenderPath {
        self.inner.extractor.lock().render_path()
    }

    pub fn buffer_return(&self) -> BufferReturn {
        BufferReturn {
            extractor: Arc::clone(&self.inner.extractor),
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        self.inner.frames_delivered.load(Ordering::Relaxed)
    }

    pub fn set_frame_consumer(&self, consumer: Option<Arc<dyn FrameConsumer>>) {
        *self.inner.consumer.write() = consumer;
    }

    pub fn add_frame_callback<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ImageData) + Send + Sync + 'static,
    {
        self.inner.frame_callbacks.add(callback)
    }

    pub fn add_error_callback<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CameraError) + Send + Sync + 'static,
    {
        self.inner.error_callbacks.add(callback)
    }

    /// Re-enumerate video inputs. Concurrent calls return the current list
    /// instead of enumerating twice.
    pub async fn refresh_cameras(&self) -> std::result::Result<Vec<Arc<Camera>>, CameraError> {
        self.enumerate().await.map_err(|e| {
            self.inner.report(&e);
            e
        })
    }

    async fn enumerate(&self) -> std::result::Result<Vec<Arc<Camera>>, CameraError> {
        let store = &self.inner.store;
        let already_querying = store.update(|s| std::mem::replace(&mut s.is_querying, true));
        if already_querying {
            debug!("Camera enumeration already in flight");
            return Ok(store.cameras());
        }

        let devices = match self.inner.devices.enumerate_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                store.update(|s| s.is_querying = false);
                warn!("Camera enumeration failed: {}", e);
                return Err(e);
            }
        };

        let existing = store.cameras();
        let cameras: Vec<Arc<Camera>> = devices
            .iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .map(|info| {
                existing
                    .iter()
                    .find(|c| c.device_id() == info.device_id)
                    .cloned()
                    .unwrap_or_else(|| {
                        Arc::new(Camera::new(info, Arc::clone(&self.inner.devices)))
                    })
            })
            .collect();

        info!("Found {} cameras", cameras.len());
        store.update(|s| {
            s.cameras = cameras.clone();
            s.is_querying = false;
        });
        Ok(cameras)
    }

    /// Open the selected camera, choosing one first if needed, and attach it
    /// to the video element. Playback starts when configured to.
    pub async fn start_camera_stream(&self) -> std::result::Result<(), CameraError> {
        let auto_play = self.settings().auto_start_playback;
        self.open_stream(auto_play).await
    }

    async fn open_stream(&self, play: bool) -> std::result::Result<(), CameraError> {
        self.inner.abort_requested.store(false, Ordering::SeqCst);
        let opened = self.acquire_stream().await;

        if self.inner.abort_requested.swap(false, Ordering::SeqCst) {
            info!("Camera stream start aborted by user");
            if opened.is_ok() {
                if let Some(camera) = self.selected_camera() {
                    camera.stop_stream();
                }
            }
            self.inner.video.detach();
            self.inner.store.update(|s| {
                s.playback_state = PlaybackState::Idle;
                s.resume_request = None;
            });
            return Ok(());
        }

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.report(&e);
                return Err(e);
            }
        };

        let mirror = self.selected_camera().map_or(false, |camera| {
            self.settings().mirror_front_camera && camera.facing() == FacingMode::Front
        });
        self.inner.video.attach(stream);
        self.inner.video.set_mirror_x(mirror);
        self.inner.store.update(|s| {
            s.mirror_x = mirror;
            s.error = None;
        });

        if play {
            self.start_playback()?;
        }
        Ok(())
    }

    async fn acquire_stream(&self) -> std::result::Result<Arc<dyn MediaStream>, CameraError> {
        let settings = self.settings();

        if let Some(camera) = self.selected_camera() {
            return camera.start_stream(settings.resolution).await;
        }

        let mut cameras = self.inner.store.cameras();
        if cameras.is_empty() {
            cameras = self.enumerate().await?;
        }

        let camera = find_ideal_camera(&cameras, settings.resolution, settings.facing).await?;
        let stream = camera
            .active_stream()
            .ok_or_else(|| CameraError::TrackEnded {
                device: camera.device_id().to_string(),
            })?;
        self.inner
            .store
            .update(|s| s.selected_camera = Some(Arc::clone(&camera)));
        Ok(stream)
    }

    /// Ask a pending [`start_camera_stream`](Self::start_camera_stream) to
    /// give up. The start resets quietly instead of reporting an error.
    pub fn abort_stream_start(&self) {
        self.inner.abort_requested.store(true, Ordering::SeqCst);
    }

    pub fn start_playback(&self) -> std::result::Result<(), CameraError> {
        self.inner.video.play()?;
        self.inner.store.update(|s| {
            if s.playback_state == PlaybackState::Idle {
                s.playback_state = PlaybackState::Playback;
            }
        });
        debug!("Playback started");
        Ok(())
    }

    /// Pause the video and cancel frame capture. The camera stays open.
    pub fn pause_playback(&self) {
        self.inner.cancel_frame_loop();
        self.inner.video.pause();
        self.inner
            .store
            .update(|s| s.playback_state = PlaybackState::Idle);
        debug!("Playback paused");
    }

    /// Same as [`pause_playback`](Self::pause_playback)
    pub fn stop_stream(&self) {
        self.pause_playback();
    }

    /// Stop playback and close the camera's stream
    pub fn release_camera(&self) {
        self.pause_playback();
        if let Some(camera) = self.selected_camera() {
            camera.stop_stream();
        }
        self.inner.video.detach();
        info!("Camera released");
    }

    /// Start delivering frames, opening the camera and starting playback
    /// first when needed.
    pub async fn start_frame_capture(&self) -> std::result::Result<(), CameraError> {
        // While suspended, only record that capture is wanted on resume
        let deferred = self.inner.store.update(|s| {
            let suspended = s.playback_state == PlaybackState::Idle && s.resume_request.is_some();
            if suspended {
                s.resume_request = Some(PlaybackState::Capturing);
            }
            suspended
        });
        if deferred {
            info!("Camera suspended, frame capture deferred until resume");
            return Ok(());
        }

        match self.playback_state() {
            PlaybackState::Capturing => return Ok(()),
            PlaybackState::Playback => {}
            PlaybackState::Idle => {
                let streaming = self
                    .selected_camera()
                    .map_or(false, |camera| camera.is_streaming());
                if !streaming || !self.inner.video.has_source() {
                    self.open_stream(false).await?;
                    if !self.inner.video.has_source() {
                        // Start was aborted
                        return Ok(());
                    }
                }
                self.start_playback()?;
            }
        }

        {
            let mut task = self.inner.frame_task.lock();
            if task.is_none() {
                let token = CancellationToken::new();
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(inner.run_frame_loop(token.clone()));
                *task = Some(FrameTask {
                    token,
                    _handle: handle,
                });
            }
        }

        self.inner.store.update(|s| {
            s.playback_state = PlaybackState::Capturing;
            s.resume_request = None;
        });
        Ok(())
    }

    /// Stop delivering frames but keep playing
    pub fn stop_frame_capture(&self) {
        self.inner.cancel_frame_loop();
        self.inner.store.update(|s| {
            if s.playback_state == PlaybackState::Capturing {
                s.playback_state = PlaybackState::Playback;
            }
        });
    }

    /// Switch to `camera`, restoring playback or capture afterwards.
    /// Fails with `SwapInProgress` while another swap is running.
    pub async fn select_camera(&self, camera: Arc<Camera>) -> std::result::Result<(), CameraError> {
        let busy = self
            .inner
            .store
            .update(|s| std::mem::replace(&mut s.is_swapping, true));
        if busy {
            warn!("Camera swap to {} rejected, swap in progress", camera.name());
            return Err(CameraError::SwapInProgress);
        }

        let result = self.swap_to(camera).await;
        self.inner.store.update(|s| s.is_swapping = false);
        result
    }

    async fn swap_to(&self, camera: Arc<Camera>) -> std::result::Result<(), CameraError> {
        let previous = self.selected_camera();
        if let Some(previous) = &previous {
            if Arc::ptr_eq(previous, &camera) {
                debug!("Camera {} already selected", camera.name());
                return Ok(());
            }
        }

        let had_stream = self.suspend();
        info!("Switching camera to {}", camera.name());
        self.inner
            .store
            .update(|s| s.selected_camera = Some(camera));
        self.resume(had_stream).await
    }

    /// Stop everything and record what to restore. Returns whether a stream
    /// was open.
    fn suspend(&self) -> bool {
        let prior = self.playback_state();
        let camera = self.selected_camera();
        let had_stream = camera.as_ref().map_or(false, |c| c.is_streaming());

        self.inner.cancel_frame_loop();
        self.inner.video.pause();
        self.inner.store.update(|s| {
            s.resume_request = Some(prior);
            s.playback_state = PlaybackState::Idle;
        });
        if let Some(camera) = camera {
            camera.stop_stream();
        }
        self.inner.video.detach();
        had_stream
    }

    async fn resume(&self, had_stream: bool) -> std::result::Result<(), CameraError> {
        let prior = self
            .inner
            .store
            .update(|s| s.resume_request.take())
            .unwrap_or_default();

        debug!("Resuming camera in {} state", prior);
        match prior {
            PlaybackState::Idle if had_stream => self.open_stream(false).await,
            PlaybackState::Idle => Ok(()),
            PlaybackState::Playback => self.open_stream(true).await,
            PlaybackState::Capturing => self.start_frame_capture().await,
        }
    }

    /// Reopen the current camera at a new resolution, keeping its state
    pub async fn set_resolution(
        &self,
        resolution: VideoResolution,
    ) -> std::result::Result<(), CameraError> {
        let current = {
            let mut settings = self.inner.settings.write();
            std::mem::replace(&mut settings.resolution, resolution)
        };
        if current == resolution {
            return Ok(());
        }

        let streaming = self
            .selected_camera()
            .map_or(false, |camera| camera.is_streaming());
        if !streaming {
            return Ok(());
        }

        info!("Changing resolution from {} to {}", current, resolution);
        let had_stream = self.suspend();
        self.resume(had_stream).await
    }

    pub async fn toggle_torch(&self) -> std::result::Result<bool, CameraError> {
        let camera = self
            .selected_camera()
            .ok_or(CameraError::NoCameraSelected)?;
        camera.toggle_torch().await.map_err(|e| {
            self.inner.report(&e);
            e
        })
    }

    pub fn set_mirror_x(&self, mirror: bool) {
        self.inner.video.set_mirror_x(mirror);
        self.inner.store.update(|s| s.mirror_x = mirror);
    }

    /// Hidden pages never process frames: going hidden closes the camera,
    /// coming back reopens it in the state it was left in.
    pub async fn handle_visibility_change(
        &self,
        visible: bool,
    ) -> std::result::Result<(), CameraError> {
        if visible {
            if self.inner.store.snapshot().resume_request.is_none() {
                return Ok(());
            }
            info!("Page visible again, restoring camera");
            return self.resume(true).await;
        }

        let streaming = self
            .selected_camera()
            .map_or(false, |camera| camera.is_streaming());
        if !streaming && self.playback_state() == PlaybackState::Idle {
            return Ok(());
        }

        info!("Page hidden in {} state, stopping camera", self.playback_state());
        self.suspend();
        Ok(())
    }

    /// Tear down the stream and drop all observers
    pub fn dispose(&self) {
        self.release_camera();
        self.set_frame_consumer(None);
        self.inner.frame_callbacks.clear();
        self.inner.error_callbacks.clear();
        self.inner.store.clear_subscribers();
        info!("Camera stream controller disposed");
    }
}

/// Builder for [`CameraStreamController`]
pub struct CameraStreamControllerBuilder {
    devices: Option<Arc<dyn MediaDevices>>,
    settings: ControllerSettings,
    provider: Option<Box<dyn ContextProvider>>,
}

impl CameraStreamControllerBuilder {
    pub fn new() -> Self {
        Self {
            devices: None,
            settings: ControllerSettings::default(),
            provider: None,
        }
    }

    pub fn devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn context_provider(mut self, provider: Box<dyn ContextProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<CameraStreamController> {
        let devices = self
            .devices
            .ok_or_else(|| DocscanError::system("Media devices must be specified"))?;

        let controller = match self.provider {
            Some(provider) => CameraStreamController::new(devices, self.settings, provider.as_ref()),
            None => CameraStreamController::new(devices, self.settings, &DefaultContextProvider),
        };
        Ok(controller)
    }
}

impl Default for CameraStreamControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
