use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::binding::{bind_with, BindOptions};
use crate::error::Result;
use crate::store::{Listener, Store, StoreApi, StoreSetter, Subscription};
use crate::tracked::Tracked;

/// A store that can also be read as tracked projections.
///
/// Every method of the wrapped store is reachable through `Deref`, and a
/// `BoundStore` is itself a [`StoreApi`], so it can be passed on wherever a store
/// is expected.
///
/// # Examples
///
/// ```
/// use tincan_bind::runtime::create_root;
/// use tincan_bind::create;
///
/// let bears = create(|_| 0u32);
/// create_root(|_scope| {
///     let count = bears.read().unwrap();
///     bears.set_state(3);
///     assert_eq!(count.get().unwrap(), 3);
/// });
/// ```
pub struct BoundStore<S> {
    api: S,
}

impl<S> BoundStore<S>
where
    S: StoreApi + Clone + 'static,
{
    /// Wrap an existing store as-is.
    pub fn new(api: S) -> Self {
        Self { api }
    }

    /// The wrapped store.
    pub fn api(&self) -> &S {
        &self.api
    }

    /// Unwrap the store, dropping the binding helpers.
    pub fn into_inner(self) -> S {
        self.api
    }

    /// Track the whole state.
    pub fn read(&self) -> Result<Tracked<S::State>>
    where
        S::State: Clone + Serialize + DeserializeOwned,
    {
        self.bind(BindOptions::identity())
    }

    /// Track a derived slice, reconciling on every notification.
    pub fn select<U, F>(&self, selector: F) -> Result<Tracked<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(&S::State) -> U + Send + Sync + 'static,
    {
        self.bind(BindOptions::select(selector))
    }

    /// Track a derived slice, reconciling only when `equals` reports a change.
    pub fn select_with<U, F, E>(&self, selector: F, equals: E) -> Result<Tracked<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(&S::State) -> U + Send + Sync + 'static,
        E: Fn(&U, &U) -> bool + Send + Sync + 'static,
    {
        self.bind(BindOptions::select(selector).equals(equals))
    }

    /// Track a slice described by explicit options.
    pub fn bind<U>(&self, options: BindOptions<S::State, U>) -> Result<Tracked<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
    {
        bind_with(&self.api, options)
    }
}

impl<S> Deref for BoundStore<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.api
    }
}

impl<S: Clone> Clone for BoundStore<S> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
        }
    }
}

impl<S> From<S> for BoundStore<S>
where
    S: StoreApi + Clone + 'static,
{
    fn from(api: S) -> Self {
        Self::new(api)
    }
}

impl<S: StoreApi> StoreApi for BoundStore<S> {
    type State = S::State;

    fn get_state(&self) -> Arc<S::State> {
        self.api.get_state()
    }

    fn subscribe(&self, listener: Listener<S::State>) -> Subscription {
        self.api.subscribe(listener)
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for BoundStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoundStore").field(&self.api).finish()
    }
}

/// Build a [`Store`] from `initializer` and wrap it.
pub fn create<T, F>(initializer: F) -> BoundStore<Store<T>>
where
    T: Send + Sync + 'static,
    F: FnOnce(&StoreSetter<T>) -> T,
{
    BoundStore::new(Store::create(initializer))
}

/// Factory waiting for an initializer; see [`create_deferred`].
pub struct BoundStoreFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> BoundStoreFactory<T> {
    /// A factory for stores of `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Same as calling [`create`] directly.
    pub fn create<F>(&self, initializer: F) -> BoundStore<Store<T>>
    where
        F: FnOnce(&StoreSetter<T>) -> T,
    {
        create(initializer)
    }
}

impl<T: Send + Sync + 'static> Default for BoundStoreFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BoundStoreFactory<T> {
    fn clone(&self) -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

/// Fix the state type now and supply the initializer later.
///
/// ```
/// use tincan_bind::create_deferred;
///
/// let factory = create_deferred::<Vec<String>>();
/// let store = factory.create(|_| vec!["first".to_string()]);
/// assert_eq!(store.get_state().len(), 1);
/// ```
pub fn create_deferred<T: Send + Sync + 'static>() -> BoundStoreFactory<T> {
    BoundStoreFactory::new()
}
