use super::watchdog::Watchdog;
use crate::callbacks::{CallbackSet, Subscription};
use crate::camera::{BufferReturn, CameraStreamController, FrameConsumer, PlaybackState};
use crate::engine::{AnalysisResult, DocumentClassInfo, FinalResult, ProcessingStatus, RecognitionEngine};
use crate::error::{DocscanError, Result};
use crate::frame::ImageData;
use crate::ui_state::{
    classify, default_descriptors, ClassifierSettings, Clock, DescriptorMap, FeedbackStabilizer,
    StabilizerOptions, UiStateDescriptor, UiStateKey,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Accepts (`true`) or rejects a recognized document class
pub type DocumentFilter = Arc<dyn Fn(&DocumentClassInfo) -> bool + Send + Sync>;

/// Scan session tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UxSettings {
    /// No state change for this long stops the scan
    pub timeout: Duration,
    /// Pause after a side or the document is captured
    pub transition_delay: Duration,
    pub classifier: ClassifierSettings,
    pub stabilizer: StabilizerOptions,
}

impl Default for UxSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            transition_delay: Duration::from_millis(1000),
            classifier: ClassifierSettings::default(),
            stabilizer: StabilizerOptions::default(),
        }
    }
}

/// Milliseconds on the tokio clock, so paused test time drives the stabilizer
struct RuntimeClock {
    origin: tokio::time::Instant,
}

impl Clock for RuntimeClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A stabilized UI state switch
#[derive(Debug, Clone, PartialEq)]
pub struct UiStateChange {
    pub previous: UiStateKey,
    pub current: UiStateDescriptor<UiStateKey>,
}

/// Final result of a completed scan session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub result: FinalResult,
}

struct UxInner {
    controller: CameraStreamController,
    engine: Arc<dyn RecognitionEngine>,
    settings: UxSettings,
    stabilizer: Mutex<FeedbackStabilizer<UiStateKey>>,
    document_filter: RwLock<Option<DocumentFilter>>,
    watchdog: Watchdog,
    transition: Mutex<Option<JoinHandle<()>>>,
    processing: AtomicBool,
    disposed: AtomicBool,
    session_id: RwLock<Uuid>,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
    ui_state_callbacks: CallbackSet<UiStateChange>,
    frame_process_callbacks: CallbackSet<AnalysisResult>,
    result_callbacks: CallbackSet<ScanOutcome>,
    error_callbacks: CallbackSet<DocscanError>,
    timeout_callbacks: CallbackSet<Duration>,
}

impl UxInner {
    fn arm_watchdog(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.watchdog.arm(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_timeout();
            }
        });
    }

    fn on_timeout(&self) {
        let after = self.watchdog.timeout();
        warn!("Scan timed out after {:?} without progress", after);
        self.controller.stop_frame_capture();
        self.stabilizer.lock().reset();
        self.timeout_callbacks.emit(&after);
        self.report(DocscanError::ScanTimeout { after });
    }

    fn report(&self, error: DocscanError) {
        self.error_callbacks.emit(&error);
    }

    fn give_back(&self, buffers: &BufferReturn, image: ImageData) {
        if let Err(e) = buffers.reattach(image.into_data()) {
            error!("Frame buffer protocol violated: {}", e);
            self.report(e.into());
        }
    }

    async fn process_frame(self: &Arc<Self>, image: ImageData, buffers: BufferReturn) {
        trace!("Processing {}x{} frame", image.width, image.height);
        let outcome = match self.engine.process(image).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The engine kept the buffer; the extractor allocates a new one
                error!("Recognition engine failed: {}", e);
                self.report(e.into());
                return;
            }
        };

        if let Some(image) = outcome.image {
            self.give_back(&buffers, image);
        }

        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let mut result = outcome.result;
        self.apply_document_filter(&mut result);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.frame_process_callbacks.emit(&result);

        if self.controller.playback_state() != PlaybackState::Capturing {
            debug!("Capture stopped while the frame was processed, ignoring result");
            return;
        }

        let key = classify(&result, &self.settings.classifier);
        let (previous, current) = {
            let mut stabilizer = self.stabilizer.lock();
            let previous = stabilizer.current_key();
            (previous, stabilizer.submit_event(key))
        };

        if current.key != previous {
            self.on_state_change(previous, current);
        }
    }

    fn apply_document_filter(&self, result: &mut AnalysisResult) {
        let filter = self.document_filter.read().clone();
        if let Some(filter) = filter {
            if result.document_class.is_fully_known() && !filter(&result.document_class) {
                debug!("Document class {:?} rejected by filter", result.document_class);
                result.processing_status = ProcessingStatus::UnsupportedDocument;
            }
        }
    }

    fn on_state_change(self: &Arc<Self>, previous: UiStateKey, current: UiStateDescriptor<UiStateKey>) {
        info!("UI state {} -> {}", previous, current.key);
        self.ui_state_callbacks.emit(&UiStateChange { previous, current });
        self.arm_watchdog();

        if current.key.is_transitional() {
            self.controller.stop_frame_capture();
            let inner = Arc::clone(self);
            let handle = tokio::spawn(async move { inner.run_transition(current.key).await });
            if let Some(previous) = self.transition.lock().replace(handle) {
                previous.abort();
            }
        }
    }

    async fn run_transition(self: Arc<Self>, key: UiStateKey) {
        let delay = self.settings.transition_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        match key {
            UiStateKey::SideCaptured => {
                info!("First side captured, resuming capture for the other side");
                if let Err(e) = self.controller.start_frame_capture().await {
                    self.report(e.into());
                }
            }
            UiStateKey::DocumentCaptured => match self.engine.get_result().await {
                Ok(result) => {
                    let outcome = ScanOutcome {
                        session_id: *self.session_id.read(),
                        completed_at: Utc::now(),
                        result,
                    };
                    info!(
                        "Document scanned in session {} with {} fields",
                        outcome.session_id,
                        outcome.result.fields.len()
                    );
                    self.result_callbacks.emit(&outcome);
                }
                Err(e) => {
                    error!("Failed to fetch final result: {}", e);
                    self.report(e.into());
                }
            },
            UiStateKey::UnsupportedDocument => {
                warn!("Unsupported document presented");
                self.report(DocscanError::UnsupportedDocument {
                    details: "document class is not accepted".to_string(),
                });
            }
            _ => {}
        }
    }
}

struct UxFrameConsumer {
    inner: Weak<UxInner>,
}

impl FrameConsumer for UxFrameConsumer {
    fn on_frame(&self, image: ImageData, buffers: BufferReturn) {
        let Some(inner) = self.inner.upgrade() else {
            if let Err(e) = buffers.reattach(image.into_data()) {
                error!("Frame buffer protocol violated after manager drop: {}", e);
            }
            return;
        };

        // Drop, don't queue, while the engine is busy
        if inner.processing.swap(true, Ordering::SeqCst) {
            inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Engine busy, dropping frame");
            inner.give_back(&buffers, image);
            return;
        }

        tokio::spawn(async move {
            inner.process_frame(image, buffers).await;
            inner.processing.store(false, Ordering::SeqCst);
        });
    }
}

/// Drives a scan session: frames from the camera go to the recognition
/// engine, results become UI states, and a watchdog ends stalled scans.
pub struct UxManager {
    inner: Arc<UxInner>,
}

impl UxManager {
    pub fn new(
        controller: CameraStreamController,
        engine: Arc<dyn RecognitionEngine>,
        settings: UxSettings,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(RuntimeClock {
            origin: tokio::time::Instant::now(),
        });
        Self::with_parts(controller, engine, settings, default_descriptors(), clock)
    }

    /// Full control over the state table and the stabilizer's clock
    pub fn with_parts(
        controller: CameraStreamController,
        engine: Arc<dyn RecognitionEngine>,
        settings: UxSettings,
        descriptors: DescriptorMap<UiStateKey>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let stabilizer = FeedbackStabilizer::new(
            descriptors,
            UiStateKey::SensingFront,
            settings.stabilizer,
            clock,
        )?;

        let inner = Arc::new(UxInner {
            controller,
            engine,
            settings,
            stabilizer: Mutex::new(stabilizer),
            document_filter: RwLock::new(None),
            watchdog: Watchdog::new(settings.timeout),
            transition: Mutex::new(None),
            processing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            session_id: RwLock::new(Uuid::new_v4()),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
            ui_state_callbacks: CallbackSet::new("ui_state_change"),
            frame_process_callbacks: CallbackSet::new("frame_process"),
            result_callbacks: CallbackSet::new("result"),
            error_callbacks: CallbackSet::new("ux_error"),
            timeout_callbacks: CallbackSet::new("timeout"),
        });

        Self::wire(&inner);
        Ok(Self { inner })
    }

    fn wire(inner: &Arc<UxInner>) {
        let weak = Arc::downgrade(inner);
        let store_sub = inner.controller.store().subscribe(move |change| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let was = change.previous == PlaybackState::Capturing;
            let is = change.current.playback_state == PlaybackState::Capturing;
            if !was && is {
                inner.arm_watchdog();
            } else if was && !is {
                inner.watchdog.disarm();
            }
        });

        let weak = Arc::downgrade(inner);
        let error_sub = inner.controller.add_error_callback(move |e| {
            if let Some(inner) = weak.upgrade() {
                inner.report(DocscanError::Camera(e.clone()));
            }
        });

        inner.subscriptions.lock().extend([store_sub, error_sub]);
        inner
            .controller
            .set_frame_consumer(Some(Arc::new(UxFrameConsumer {
                inner: Arc::downgrade(inner),
            })));
    }

    pub fn controller(&self) -> &CameraStreamController {
        &self.inner.controller
    }

    /// Restrict which document classes may be scanned
    pub fn set_document_filter(&self, filter: Option<DocumentFilter>) {
        *self.inner.document_filter.write() = filter;
    }

    pub fn current_ui_state(&self) -> UiStateKey {
        self.inner.stabilizer.lock().current_key()
    }

    pub fn session_id(&self) -> Uuid {
        *self.inner.session_id.read()
    }

    pub fn frames_processed(&self) -> u64 {
        self.inner.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.inner.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.inner.watchdog.is_armed()
    }

    pub fn on_ui_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UiStateChange) + Send + Sync + 'static,
    {
        self.inner.ui_state_callbacks.add(callback)
    }

    pub fn on_frame_processed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AnalysisResult) + Send + Sync + 'static,
    {
        self.inner.frame_process_callbacks.add(callback)
    }

    pub fn on_result<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ScanOutcome) + Send + Sync + 'static,
    {
        self.inner.result_callbacks.add(callback)
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DocscanError) + Send + Sync + 'static,
    {
        self.inner.error_callbacks.add(callback)
    }

    pub fn on_timeout<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Duration) + Send + Sync + 'static,
    {
        self.inner.timeout_callbacks.add(callback)
    }

    /// Open the camera if needed and start feeding frames to the engine
    pub async fn start(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(DocscanError::system("UX manager has been disposed"));
        }
        info!("Starting scan session {}", self.session_id());
        self.inner.controller.start_frame_capture().await?;
        Ok(())
    }

    /// Forget all progress and scan a new document from the first side
    pub async fn reset_scanning_session(&self) -> Result<()> {
        if let Some(handle) = self.inner.transition.lock().take() {
            handle.abort();
        }
        self.inner.controller.stop_frame_capture();
        self.inner.engine.reset().await?;
        self.inner.stabilizer.lock().reset();

        let session_id = Uuid::new_v4();
        *self.inner.session_id.write() = session_id;
        info!("Scan session reset, new session {}", session_id);

        self.start().await
    }

    /// Stop capture, cancel timers and drop every subscriber
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.inner.transition.lock().take() {
            handle.abort();
        }
        self.inner.controller.set_frame_consumer(None);
        self.inner.controller.stop_frame_capture();
        self.inner.watchdog.disarm();

        for subscription in self.inner.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        self.inner.ui_state_callbacks.clear();
        self.inner.frame_process_callbacks.clear();
        self.inner.result_callbacks.clear();
        self.inner.error_callbacks.clear();
        self.inner.timeout_callbacks.clear();
        info!("UX manager disposed");
    }
}

impl Drop for UxManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
