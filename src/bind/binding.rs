use std::fmt;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::runtime::on_cleanup;
use crate::store::{Listener, StoreApi};
use crate::sync::{lock, RunGate};
use crate::tracked::{to_tracked_value, ReconcileOptions, Tracked};

/// Projection from a store's state to the slice a binding tracks.
pub type Selector<S, U> = Arc<dyn Fn(&S) -> U + Send + Sync>;

/// Returns `true` when two slices should be considered the same.
pub type Equality<U> = Arc<dyn Fn(&U, &U) -> bool + Send + Sync>;

/// What a binding projects and when it writes.
///
/// Without an equality function every store notification reconciles the
/// projection, even when the new slice equals the old one.
pub struct BindOptions<S, U> {
    selector: Selector<S, U>,
    equals: Option<Equality<U>>,
    reconcile: ReconcileOptions,
}

impl<S: Clone + 'static> BindOptions<S, S> {
    /// Project the whole state.
    pub fn identity() -> Self {
        Self::select(S::clone)
    }
}

impl<S, U> BindOptions<S, U> {
    /// Project the slice returned by `selector`.
    pub fn select<F>(selector: F) -> Self
    where
        F: Fn(&S) -> U + Send + Sync + 'static,
    {
        Self {
            selector: Arc::new(selector),
            equals: None,
            reconcile: ReconcileOptions::default(),
        }
    }

    /// Skip notifications whose slice `equals` the last reconciled one.
    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&U, &U) -> bool + Send + Sync + 'static,
    {
        self.equals = Some(Arc::new(equals));
        self
    }

    /// Use `options` when reconciling new slices into the projection.
    pub fn reconcile_options(mut self, options: ReconcileOptions) -> Self {
        self.reconcile = options;
        self
    }
}

impl<S, U> Clone for BindOptions<S, U> {
    fn clone(&self) -> Self {
        Self {
            selector: Arc::clone(&self.selector),
            equals: self.equals.clone(),
            reconcile: self.reconcile.clone(),
        }
    }
}

impl<S, U> fmt::Debug for BindOptions<S, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("equals", &self.equals.is_some())
            .field("reconcile", &self.reconcile)
            .finish_non_exhaustive()
    }
}

/// Track a store's whole state.
pub fn bind<S>(store: &S) -> Result<Tracked<S::State>>
where
    S: StoreApi + Clone + 'static,
    S::State: Clone + Serialize + DeserializeOwned,
{
    bind_with(store, BindOptions::identity())
}

/// Track a derived slice, reconciling on every store notification.
pub fn bind_select<S, U, F>(store: &S, selector: F) -> Result<Tracked<U>>
where
    S: StoreApi + Clone + 'static,
    U: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(&S::State) -> U + Send + Sync + 'static,
{
    bind_with(store, BindOptions::select(selector))
}

/// Track a derived slice, reconciling only when `equals` reports a difference.
pub fn bind_select_with<S, U, F, E>(store: &S, selector: F, equals: E) -> Result<Tracked<U>>
where
    S: StoreApi + Clone + 'static,
    U: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(&S::State) -> U + Send + Sync + 'static,
    E: Fn(&U, &U) -> bool + Send + Sync + 'static,
{
    bind_with(store, BindOptions::select(selector).equals(equals))
}

/// Bind a store to a new tracked projection.
///
/// The initial slice is computed and the store subscribed before this returns.
/// Notifications that overlap, from other threads or from effects re-run by a
/// write, are folded into one more pass over the latest state. The subscription is released when the active scope is disposed; outside a
/// scope it is never released. Panics from the selector or equality function
/// propagate to the caller, or to whoever triggered the store notification.
///
/// # Examples
///
/// ```
/// use tincan_bind::runtime::create_root;
/// use tincan_bind::{bind_with, BindOptions, Store};
///
/// let store = Store::new((1, "a".to_string()));
/// let scope = create_root(|scope| {
///     let count = bind_with(&store, BindOptions::select(|s: &(i32, String)| s.0)).unwrap();
///     store.update(|s| s.0 += 1);
///     assert_eq!(count.get().unwrap(), 2);
///     scope
/// });
///
/// scope.dispose();
/// assert_eq!(store.listener_count(), 0);
/// ```
pub fn bind_with<S, U>(store: &S, options: BindOptions<S::State, U>) -> Result<Tracked<U>>
where
    S: StoreApi + Clone + 'static,
    U: Serialize + DeserializeOwned + Send + 'static,
{
    let BindOptions {
        selector,
        equals,
        reconcile,
    } = options;

    let initial = selector(&store.get_state());
    let tracked = Tracked::with_options(&initial, reconcile)?;

    // Passes run one at a time and always read the latest state, so the last pass
    // reflects the last write even when notifications overlap.
    let gate = RunGate::default();
    let listener: Listener<S::State> = match equals {
        Some(equals) => {
            let recorded = Mutex::new(initial);
            let store = store.clone();
            let tracked = tracked.clone();
            Arc::new(move |_state: &S::State, _prev: &S::State| {
                gate.run(|| {
                    let next = selector(&store.get_state());
                    let value = {
                        let mut recorded = lock(&recorded);
                        if equals(&*recorded, &next) {
                            return;
                        }
                        let value = match to_tracked_value(&next) {
                            Ok(value) => value,
                            Err(err) => {
                                report(&err);
                                return;
                            }
                        };
                        *recorded = next;
                        value
                    };
                    tracked.reconcile_value(value);
                });
            })
        }
        None => {
            let store = store.clone();
            let tracked = tracked.clone();
            Arc::new(move |_state: &S::State, _prev: &S::State| {
                gate.run(|| {
                    let next = selector(&store.get_state());
                    if let Err(err) = tracked.reconcile(&next) {
                        report(&err);
                    }
                });
            })
        }
    };

    let subscription = store.subscribe(listener);
    tracing::debug!("store bound to tracked projection");
    on_cleanup(move || subscription.unsubscribe());

    Ok(tracked)
}

fn report(err: &Error) {
    tracing::error!(%err, "store slice could not be reconciled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ReactiveRuntime;
    use crate::store::Store;
    use std::collections::BTreeMap;

    // JSON object keys must be strings, so any non-empty grid fails to serialize
    type Grid = BTreeMap<(i32, i32), i32>;

    #[test]
    fn binding_outside_a_scope_keeps_its_subscription() {
        ReactiveRuntime::scope(|| {
            let store = Store::new(1);
            let tracked = bind(&store).unwrap();
            store.set_state(2);
            assert_eq!(tracked.get().unwrap(), 2);
            assert_eq!(store.listener_count(), 1);
        });
    }

    #[test]
    fn options_debug_reports_equality() {
        let options = BindOptions::select(|n: &i32| *n).equals(|a, b| a == b);
        assert!(format!("{options:?}").contains("equals: true"));
        assert!(format!("{:?}", options.clone()).contains("BindOptions"));
    }

    #[test]
    fn unserializable_slices_leave_the_projection_unchanged() {
        ReactiveRuntime::scope(|| {
            let store = Store::new(Grid::new());
            let every = bind_select(&store, |grid: &Grid| grid.clone()).unwrap();
            let changed =
                bind_select_with(&store, |grid: &Grid| grid.clone(), |a, b| a == b).unwrap();

            store.set_state(Grid::from([((0, 0), 1)]));
            assert_eq!(every.writes(), 0);
            assert_eq!(changed.writes(), 0);
            assert!(every.get().unwrap().is_empty());
            assert!(changed.get().unwrap().is_empty());

            // The failed slice was never recorded, so the empty grid is not a change
            store.set_state(Grid::new());
            assert_eq!(changed.writes(), 0);
            assert_eq!(every.writes(), 1);
        });
    }

    #[test]
    fn non_finite_slices_are_not_reconciled() {
        ReactiveRuntime::scope(|| {
            let store = Store::new(1.0_f64);
            let tracked = bind(&store).unwrap();

            store.set_state(f64::NAN);
            assert_eq!(tracked.writes(), 0);
            assert_eq!(tracked.get().unwrap(), 1.0);

            store.set_state(2.5);
            assert_eq!(tracked.get().unwrap(), 2.5);
        });
    }
}
