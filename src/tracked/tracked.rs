use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::encode::to_tracked_value;
use super::node::{parse_pointer, Node};
use super::reconcile::{reconcile_node, ReconcileOptions};
use crate::error::{Error, Result};
use crate::runtime::ReactiveRuntime;
use crate::sync::lock;

struct TrackedInner {
    runtime: Arc<ReactiveRuntime>,
    root: Arc<Node>,
    options: ReconcileOptions,
    writes: AtomicUsize,
    // Serializes reconciliations so concurrent writers never interleave
    write_lock: Mutex<()>,
}

/// A reactive projection of a value, tracked position by position.
///
/// The value is stored as a tree of nodes following its serde data model. Reading
/// registers a dependency for the current effect on exactly the positions read;
/// [`Tracked::reconcile`] merges new data into the tree and re-runs only the effects
/// that read a position whose value changed. The projection's root is never
/// replaced, and unchanged positions keep their identity.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tincan_bind::Tracked;
///
/// let tracked = Tracked::new(&json!({"a": {"x": 1}, "b": {"y": 2}})).unwrap();
/// let a = tracked.at("/a").unwrap().unwrap();
///
/// tracked.reconcile(&json!({"a": {"x": 1}, "b": {"y": 3}})).unwrap();
///
/// assert!(a.ptr_eq(&tracked.at("/a").unwrap().unwrap()));
/// assert_eq!(tracked.at("/b/y").unwrap().unwrap().get::<i32>().unwrap(), 3);
/// ```
pub struct Tracked<T> {
    inner: Arc<TrackedInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Tracked<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a projection with the default [`ReconcileOptions`].
    pub fn new(initial: &T) -> Result<Self> {
        Self::with_options(initial, ReconcileOptions::default())
    }

    /// Create a projection in the current runtime.
    ///
    /// Fails with [`Error::NonFinite`] when `initial` holds NaN or an infinity.
    pub fn with_options(initial: &T, options: ReconcileOptions) -> Result<Self> {
        let value = to_tracked_value(initial)?;
        let runtime = ReactiveRuntime::current();
        let root = Node::build(&runtime, value);
        Ok(Self {
            inner: Arc::new(TrackedInner {
                runtime,
                root,
                options,
                writes: AtomicUsize::new(0),
                write_lock: Mutex::new(()),
            }),
            _marker: PhantomData,
        })
    }

    /// Read the whole value, depending on every position in it.
    ///
    /// Fields marked `#[serde(skip)]` are never tracked, so they come back as
    /// their defaults.
    pub fn get(&self) -> Result<T> {
        serde_json::from_value(self.snapshot()).map_err(Error::Deserialize)
    }

    /// Merge `next` into the projection.
    ///
    /// Counts as a write even when nothing changes; only effects that read a
    /// changed position re-run, each at most once. A slice holding a non-finite
    /// float is rejected and leaves the projection untouched.
    pub fn reconcile(&self, next: &T) -> Result<()> {
        let value = to_tracked_value(next)?;
        self.reconcile_value(value);
        Ok(())
    }
}

impl<T> Tracked<T> {
    /// Read the whole value as JSON, depending on every position in it.
    pub fn snapshot(&self) -> Value {
        self.inner.root.snapshot(&self.inner.runtime)
    }

    /// Merge already-serialized data into the projection.
    pub fn reconcile_value(&self, next: Value) {
        let mut changed = Vec::new();
        {
            let _guard = lock(&self.inner.write_lock);
            self.inner.writes.fetch_add(1, Ordering::SeqCst);
            reconcile_node(
                &self.inner.runtime,
                &self.inner.options,
                &self.inner.root,
                next,
                &mut changed,
            );
        }
        tracing::trace!(changed = changed.len(), "reconciled tracked projection");
        self.inner.runtime.notify_many(&changed);
    }

    /// Handle to the root position.
    pub fn root(&self) -> TrackedNode {
        TrackedNode {
            runtime: Arc::clone(&self.inner.runtime),
            node: Arc::clone(&self.inner.root),
        }
    }

    /// Position at a JSON pointer such as `/todos/0/title`; see [`TrackedNode::at`].
    pub fn at(&self, path: &str) -> Result<Option<TrackedNode>> {
        self.root().at(path)
    }

    /// Number of reconciliations applied so far.
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Options used for every reconciliation into this projection.
    pub fn options(&self) -> &ReconcileOptions {
        &self.inner.options
    }

    /// Whether two handles refer to the same projection.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &self.inner.root.value_untracked())
            .field("writes", &self.writes())
            .finish()
    }
}

/// Handle to one position inside a [`Tracked`] projection.
#[derive(Clone)]
pub struct TrackedNode {
    runtime: Arc<ReactiveRuntime>,
    node: Arc<Node>,
}

impl TrackedNode {
    /// Reactive id of this position.
    pub fn id(&self) -> usize {
        self.node.id
    }

    /// Walk a JSON pointer relative to this position.
    ///
    /// Every container passed through is tracked, so an effect using `at` re-runs
    /// when the path it followed is restructured. Returns `Ok(None)` when the path
    /// does not exist.
    pub fn at(&self, path: &str) -> Result<Option<TrackedNode>> {
        let segments = parse_pointer(path).ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        let mut current = Arc::clone(&self.node);
        for segment in &segments {
            self.runtime.track_read(current.id);
            match current.child(segment) {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(TrackedNode {
            runtime: Arc::clone(&self.runtime),
            node: current,
        }))
    }

    /// Deep read as JSON, depending on this position and everything below it.
    pub fn value(&self) -> Value {
        self.node.snapshot(&self.runtime)
    }

    /// Deep read converted to `V`.
    pub fn get<V: DeserializeOwned>(&self) -> Result<V> {
        serde_json::from_value(self.value()).map_err(Error::Deserialize)
    }

    /// Number of children, depending only on the set of children.
    pub fn len(&self) -> usize {
        self.runtime.track_read(self.node.id);
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Object keys in order, depending only on the set of children.
    pub fn keys(&self) -> Vec<String> {
        self.runtime.track_read(self.node.id);
        self.node.keys()
    }

    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    /// Whether two handles refer to the same position.
    pub fn ptr_eq(&self, other: &TrackedNode) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for TrackedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedNode")
            .field("id", &self.node.id)
            .field("value", &self.node.value_untracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::create_effect;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Todo {
        id: u32,
        title: String,
        done: bool,
    }

    #[test]
    fn get_round_trips_typed_values() {
        ReactiveRuntime::scope(|| {
            let todos = vec![Todo {
                id: 1,
                title: "write".to_string(),
                done: false,
            }];
            let tracked = Tracked::new(&todos).unwrap();
            assert_eq!(tracked.get().unwrap(), todos);
            assert_eq!(tracked.writes(), 0);
        });
    }

    #[test]
    fn effects_rerun_only_for_positions_they_read() {
        ReactiveRuntime::scope(|| {
            let tracked = Tracked::new(&json!({"a": 1, "b": 2})).unwrap();

            let reads_a = create_effect({
                let tracked = tracked.clone();
                move || {
                    let _ = tracked.at("/a").unwrap().unwrap().value();
                }
            });
            let reads_all = create_effect({
                let tracked = tracked.clone();
                move || {
                    let _ = tracked.snapshot();
                }
            });

            tracked.reconcile(&json!({"a": 1, "b": 3})).unwrap();
            assert_eq!(reads_a.run_count(), 1);
            assert_eq!(reads_all.run_count(), 2);

            tracked.reconcile(&json!({"a": 5, "b": 3})).unwrap();
            assert_eq!(reads_a.run_count(), 2);
            assert_eq!(reads_all.run_count(), 3);
        });
    }

    #[test]
    fn identical_reconcile_counts_a_write_without_rerunning() {
        ReactiveRuntime::scope(|| {
            let tracked = Tracked::new(&json!({"a": [1, 2]})).unwrap();
            let effect = create_effect({
                let tracked = tracked.clone();
                move || {
                    let _ = tracked.snapshot();
                }
            });

            tracked.reconcile(&json!({"a": [1, 2]})).unwrap();
            assert_eq!(tracked.writes(), 1);
            assert_eq!(effect.run_count(), 1);
        });
    }

    #[test]
    fn len_tracks_shape_not_contents() {
        ReactiveRuntime::scope(|| {
            let tracked = Tracked::new(&json!([{"id": 1, "n": 0}])).unwrap();
            let effect = create_effect({
                let tracked = tracked.clone();
                move || {
                    let _ = tracked.root().len();
                }
            });

            tracked.reconcile(&json!([{"id": 1, "n": 9}])).unwrap();
            assert_eq!(effect.run_count(), 1);

            tracked.reconcile(&json!([{"id": 1, "n": 9}, {"id": 2, "n": 0}])).unwrap();
            assert_eq!(effect.run_count(), 2);
        });
    }

    #[test]
    fn paths_resolve_and_reject_malformed_pointers() {
        ReactiveRuntime::scope(|| {
            let tracked = Tracked::new(&json!({"todos": [{"title": "x"}]})).unwrap();
            let title = tracked.at("/todos/0/title").unwrap().unwrap();
            assert_eq!(title.get::<String>().unwrap(), "x");
            assert!(title.is_leaf());
            assert!(tracked.at("/todos/1").unwrap().is_none());
            assert!(matches!(tracked.at("todos"), Err(Error::InvalidPath(_))));
            assert_eq!(tracked.root().keys(), vec!["todos".to_string()]);
        });
    }

    #[test]
    fn root_identity_survives_kind_changes() {
        ReactiveRuntime::scope(|| {
            let tracked: Tracked<Value> = Tracked::new(&json!([1, 2])).unwrap();
            let root = tracked.root();
            tracked.reconcile(&json!({"now": "object"})).unwrap();
            assert!(root.ptr_eq(&tracked.root()));
            assert_eq!(tracked.snapshot(), json!({"now": "object"}));
        });
    }

    #[test]
    fn typed_reads_report_decode_errors() {
        ReactiveRuntime::scope(|| {
            let tracked = Tracked::new(&json!({"n": "not a number"})).unwrap();
            let n = tracked.at("/n").unwrap().unwrap();
            assert!(matches!(n.get::<u32>(), Err(Error::Deserialize(_))));
        });
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        celsius: f64,
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        ReactiveRuntime::scope(|| {
            assert!(matches!(
                Tracked::new(&Reading { celsius: f64::NAN }),
                Err(Error::NonFinite(_))
            ));

            let tracked = Tracked::new(&Reading { celsius: 21.5 }).unwrap();
            assert!(matches!(
                tracked.reconcile(&Reading {
                    celsius: f64::INFINITY
                }),
                Err(Error::NonFinite(_))
            ));
            assert_eq!(tracked.get().unwrap(), Reading { celsius: 21.5 });
            assert_eq!(tracked.writes(), 0);
        });
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Labelled {
        count: u32,
        #[serde(skip)]
        label: Option<String>,
    }

    #[test]
    fn skipped_fields_read_back_as_defaults() {
        ReactiveRuntime::scope(|| {
            let tracked = Tracked::new(&Labelled {
                count: 3,
                label: Some("kept".to_string()),
            })
            .unwrap();
            assert_eq!(
                tracked.get().unwrap(),
                Labelled {
                    count: 3,
                    label: None
                }
            );
        });
    }
}
