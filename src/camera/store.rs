use super::device::Camera;
use crate::callbacks::{CallbackSet, Subscription};
use crate::error::CameraError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Stream lifecycle: `Idle -> Playback -> Capturing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playback,
    Capturing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playback => "playback",
            PlaybackState::Capturing => "capturing",
        };
        f.write_str(s)
    }
}

/// Observable state of a [`CameraStreamController`](super::CameraStreamController)
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
    pub playback_state: PlaybackState,
    /// State to restore after a swap, resolution change or visibility loss
    pub resume_request: Option<PlaybackState>,
    pub cameras: Vec<Arc<Camera>>,
    pub selected_camera: Option<Arc<Camera>>,
    pub is_swapping: bool,
    pub is_querying: bool,
    pub mirror_x: bool,
    pub error: Option<CameraError>,
}

/// A store change: the state before and after
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub previous: PlaybackState,
    pub current: StreamSnapshot,
}

/// State shared between the controller and its observers. Every mutation
/// goes through [`StreamStore::update`], which notifies subscribers after
/// the lock is released.
pub struct StreamStore {
    state: RwLock<StreamSnapshot>,
    listeners: CallbackSet<StoreChange>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StreamSnapshot::default()),
            listeners: CallbackSet::new("stream_store"),
        }
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.state.read().clone()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.read().playback_state
    }

    pub fn selected_camera(&self) -> Option<Arc<Camera>> {
        self.state.read().selected_camera.clone()
    }

    pub fn cameras(&self) -> Vec<Arc<Camera>> {
        self.state.read().cameras.clone()
    }

    pub fn update<R>(&self, mutate: impl FnOnce(&mut StreamSnapshot) -> R) -> R {
        let (result, change) = {
            let mut state = self.state.write();
            let previous = state.playback_state;
            let result = mutate(&mut state);
            (
                result,
                StoreChange {
                    previous,
                    current: state.clone(),
                },
            )
        };

        trace!(
            "Stream store updated: {} -> {}",
            change.previous,
            change.current.playback_state
        );
        self.listeners.emit(&change);
        result
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn clear_subscribers(&self) {
        self.listeners.clear();
    }
}

impl Default for StreamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_update_notifies_with_previous_state() {
        let store = StreamStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store.subscribe(move |change| {
            sink.lock()
                .push((change.previous, change.current.playback_state));
        });

        store.update(|s| s.playback_state = PlaybackState::Playback);
        store.update(|s| s.playback_state = PlaybackState::Capturing);
        sub.unsubscribe();
        store.update(|s| s.playback_state = PlaybackState::Idle);

        assert_eq!(
            *seen.lock(),
            vec![
                (PlaybackState::Idle, PlaybackState::Playback),
                (PlaybackState::Playback, PlaybackState::Capturing),
            ]
        );
    }

    #[test]
    fn test_update_returns_closure_result() {
        let store = StreamStore::new();
        let was_swapping = store.update(|s| std::mem::replace(&mut s.is_swapping, true));
        assert!(!was_swapping);
        assert!(store.snapshot().is_swapping);
    }
}
