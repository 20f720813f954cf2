use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;

/// Single-instance timer. Arming replaces any pending timer, so at most one
/// fire is ever outstanding.
pub struct Watchdog {
    timeout: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            timer: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// (Re)start the countdown. Must be called from within a tokio runtime.
    pub fn arm<F>(&self, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let timeout = self.timeout;
        let mut timer = self.timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        *timer = Some(tokio::spawn(async move {
            sleep(timeout).await;
            on_fire();
        }));
        trace!("Watchdog armed for {:?}", timeout);
    }

    pub fn disarm(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            trace!("Watchdog disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
