use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::api::{Listener, StoreApi, Subscription};
use crate::error::{Error, Result};
use crate::sync::{read, write};

struct StoreInner<T> {
    state: RwLock<Arc<T>>,
    listeners: RwLock<Vec<(usize, Listener<T>)>>,
    next_listener: AtomicUsize,
}

/// A thread-safe external store holding immutable state snapshots.
///
/// Every write swaps in a new snapshot and then calls the listeners, in
/// subscription order, with no lock held, so listeners may read or write the
/// store again. Writes from different threads notify independently, so their
/// listener calls may interleave. Cloning a store yields another handle to the
/// same state.
///
/// # Examples
///
/// ```
/// use tincan_bind::Store;
///
/// let store = Store::new(0);
/// let subscription = store.subscribe(std::sync::Arc::new(|state: &i32, prev: &i32| {
///     assert_eq!(*state, *prev + 1);
/// }));
///
/// store.update(|n| *n += 1);
/// assert_eq!(*store.get_state(), 1);
/// subscription.unsubscribe();
/// ```
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Send + Sync + 'static> Store<T> {
    /// Create a new store with the given initial state.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(StoreInner::new(initial)),
        }
    }

    /// Create a store from an initializer that receives a handle to the store
    /// being built.
    ///
    /// The handle can be captured by actions stored in the state. It cannot read
    /// or write until the initializer has returned.
    pub fn create<F>(initializer: F) -> Self
    where
        F: FnOnce(&StoreSetter<T>) -> T,
    {
        let inner = Arc::new_cyclic(|weak| {
            let setter = StoreSetter {
                inner: weak.clone(),
            };
            StoreInner::new(initializer(&setter))
        });
        Self { inner }
    }

    /// Current state snapshot.
    pub fn get_state(&self) -> Arc<T> {
        Arc::clone(&read(&self.inner.state))
    }

    /// Replace the state and notify listeners.
    pub fn set_state(&self, next: T) {
        self.replace(Arc::new(next));
    }

    /// Compute the next state from the current one and notify listeners.
    ///
    /// `f` runs while the store is locked for writing and must not touch the store.
    pub fn set_state_with<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let (next, prev) = {
            let mut state = write(&self.inner.state);
            let next = Arc::new(f(&state));
            let prev = std::mem::replace(&mut *state, Arc::clone(&next));
            (next, prev)
        };
        self.inner.notify(&next, &prev);
    }

    /// Replace the state with an existing snapshot.
    ///
    /// Listeners are not called when `next` is the snapshot already held.
    pub fn replace(&self, next: Arc<T>) {
        let prev = {
            let mut state = write(&self.inner.state);
            if Arc::ptr_eq(&state, &next) {
                tracing::trace!("store state unchanged, skipping notification");
                return;
            }
            std::mem::replace(&mut *state, Arc::clone(&next))
        };
        self.inner.notify(&next, &prev);
    }

    /// Register a listener; see [`StoreApi::subscribe`].
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        write(&self.inner.listeners).push((id, listener));
        tracing::debug!(listener = id, "store listener subscribed");

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                write(&inner.listeners).retain(|(listener_id, _)| *listener_id != id);
                tracing::debug!(listener = id, "store listener unsubscribed");
            }
        })
    }

    /// Remove every listener.
    pub fn destroy(&self) {
        write(&self.inner.listeners).clear();
    }

    pub fn listener_count(&self) -> usize {
        read(&self.inner.listeners).len()
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    /// Update a copy of the state in place and notify listeners.
    ///
    /// `f` runs while the store is locked for writing and must not touch the store.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        self.set_state_with(|state| {
            let mut next = state.clone();
            f(&mut next);
            next
        });
    }
}

impl<T> StoreInner<T> {
    fn new(initial: T) -> Self {
        Self {
            state: RwLock::new(Arc::new(initial)),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicUsize::new(0),
        }
    }

    fn notify(&self, state: &T, prev: &T) {
        let listeners: Vec<Listener<T>> = read(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        tracing::trace!(listeners = listeners.len(), "store state changed");
        for listener in listeners {
            listener(state, prev);
        }
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("listeners", &read(&self.inner.listeners).len())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> StoreApi for Store<T> {
    type State = T;

    fn get_state(&self) -> Arc<T> {
        Store::get_state(self)
    }

    fn subscribe(&self, listener: Listener<T>) -> Subscription {
        Store::subscribe(self, listener)
    }
}

/// Weak handle to a store, given to the initializer passed to [`Store::create`].
pub struct StoreSetter<T> {
    inner: Weak<StoreInner<T>>,
}

impl<T: Send + Sync + 'static> StoreSetter<T> {
    fn store(&self) -> Result<Store<T>> {
        self.inner
            .upgrade()
            .map(|inner| Store { inner })
            .ok_or(Error::StoreDetached)
    }

    /// Current state, or `None` while the store is still being built.
    pub fn get_state(&self) -> Option<Arc<T>> {
        self.store().ok().map(|store| store.get_state())
    }

    pub fn set_state(&self, next: T) -> Result<()> {
        self.store()?.set_state(next);
        Ok(())
    }

    pub fn set_state_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.store()?.set_state_with(f);
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> StoreSetter<T> {
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        self.store()?.update(f);
        Ok(())
    }
}

impl<T> Clone for StoreSetter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    struct AppState {
        count: usize,
        name: String,
    }

    fn app_store() -> Store<AppState> {
        Store::new(AppState {
            count: 0,
            name: "test".to_string(),
        })
    }

    #[test]
    fn store_get_set() {
        let store = app_store();
        assert_eq!(store.get_state().count, 0);

        store.set_state(AppState {
            count: 42,
            name: "updated".to_string(),
        });

        assert_eq!(store.get_state().count, 42);
        assert_eq!(store.get_state().name, "updated");
    }

    #[test]
    fn store_update() {
        let store = app_store();
        store.update(|state| {
            state.count += 10;
        });
        assert_eq!(store.get_state().count, 10);
    }

    #[test]
    fn store_subscribe_and_unsubscribe() {
        let store = app_store();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let subscription = store.subscribe(Arc::new(move |_state: &AppState, _prev: &AppState| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(call_count.load(Ordering::SeqCst), 0);
        store.update(|state| state.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        store.update(|state| state.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn listeners_receive_state_and_previous_state() {
        let store = Store::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = store.subscribe(Arc::new(move |state: &i32, prev: &i32| {
            sink.lock().unwrap().push((*state, *prev));
        }));

        store.set_state(2);
        store.set_state_with(|n| n * 10);
        assert_eq!(*seen.lock().unwrap(), vec![(2, 1), (20, 2)]);
    }

    #[test]
    fn replacing_with_the_same_snapshot_does_not_notify() {
        let store = Store::new(7);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _subscription = store.subscribe(Arc::new(move |_: &i32, _: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.replace(store.get_state());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        store.replace(Arc::new(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_may_write_back_to_the_store() {
        let store = Store::new(0);
        let handle = store.clone();
        let _subscription = store.subscribe(Arc::new(move |state: &i32, _: &i32| {
            if *state < 3 {
                handle.set_state(state + 1);
            }
        }));

        store.set_state(1);
        assert_eq!(*store.get_state(), 3);
    }

    #[test]
    fn create_hands_initializer_a_working_setter() {
        #[derive(Clone)]
        struct Counter {
            count: u32,
            setter: StoreSetter<Counter>,
        }

        let store = Store::create(|setter| {
            assert!(setter.get_state().is_none());
            assert!(matches!(setter.set_state_with(|s: &Counter| s.clone()), Err(Error::StoreDetached)));
            Counter {
                count: 0,
                setter: setter.clone(),
            }
        });

        let setter = store.get_state().setter.clone();
        setter.update(|state| state.count += 5).unwrap();
        assert_eq!(store.get_state().count, 5);
        assert_eq!(setter.get_state().unwrap().count, 5);

        drop(store);
        assert!(matches!(setter.update(|state| state.count += 1), Err(Error::StoreDetached)));
    }

    #[test]
    fn destroy_removes_all_listeners() {
        let store = Store::new(0);
        let _a = store.subscribe(Arc::new(|_: &i32, _: &i32| {}));
        let _b = store.subscribe(Arc::new(|_: &i32, _: &i32| {}));
        assert_eq!(store.listener_count(), 2);
        store.destroy();
        assert_eq!(store.listener_count(), 0);
    }
}
