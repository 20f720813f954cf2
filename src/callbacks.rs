use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
}

/// Set of independent subscribers for one kind of notification.
///
/// Callbacks are invoked in registration order. A panicking callback is
/// caught and logged so that the remaining subscribers (and the frame loop
/// that usually drives the emission) keep running.
pub struct CallbackSet<T> {
    name: &'static str,
    registry: Arc<Registry<T>>,
}

impl<T> CallbackSet<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback. Dropping the returned handle does not unsubscribe;
    /// call [`Subscription::unsubscribe`] explicitly.
    pub fn add<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.callbacks.lock().push((id, Arc::new(callback)));
        debug!("Registered {} callback #{}", self.name, id);

        let weak: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.callbacks.lock().retain(|(cb_id, _)| *cb_id != id);
                }
            })),
        }
    }

    /// Invoke every registered callback with `value`
    pub fn emit(&self, value: &T) {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<Callback<T>> = self
            .registry
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                error!("A {} callback panicked; continuing with remaining subscribers", self.name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.registry.callbacks.lock().clear();
    }
}

/// Handle returned by callback registration
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
