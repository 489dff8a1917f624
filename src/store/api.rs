use std::fmt;
use std::sync::{Arc, Mutex};

use crate::sync::lock;

/// Listener called after every state change with `(state, previous_state)`.
pub type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// The shape a store must have to be bound to a reactive projection.
///
/// The state type is declared on the store rather than inferred from it, so a
/// binding knows what its selector receives at compile time.
pub trait StoreApi: Send + Sync {
    type State: Send + Sync + 'static;

    /// Current state snapshot. Must be a pure read.
    fn get_state(&self) -> Arc<Self::State>;

    /// Register a listener called synchronously after each state change.
    fn subscribe(&self, listener: Listener<Self::State>) -> Subscription;
}

/// Handle to a store listener registration.
///
/// Unsubscribing is idempotent: only the first call reaches the store. Dropping
/// the handle does not unsubscribe.
pub struct Subscription {
    unsubscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            unsubscribe: Mutex::new(Some(Box::new(unsubscribe))),
        }
    }

    /// Remove the listener from its store. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let unsubscribe = lock(&self.unsubscribe).take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.unsubscribe).is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
