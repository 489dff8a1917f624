use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::sync::lock;

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Dependency graph between tracked nodes and the observers that read them.
struct ReactiveContext {
    current_observer: Option<usize>,
    // Map from node ID to set of observer IDs that depend on it
    dependencies: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to set of node IDs it depends on
    observer_deps: HashMap<usize, HashSet<usize>>,
    observers: HashMap<usize, Observer>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            current_observer: None,
            dependencies: HashMap::new(),
            observer_deps: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    fn untrack_observer(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for node_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&node_id) {
                    deps.remove(&observer_id);
                    if deps.is_empty() {
                        self.dependencies.remove(&node_id);
                    }
                }
            }
        }
    }
}

/// Reactive runtime owning the dependency graph of tracked projections and effects.
///
/// Supports both a global runtime (default) and scoped runtimes for isolation.
///
/// # Examples
///
/// ```
/// use tincan_bind::runtime::ReactiveRuntime;
/// use tincan_bind::Tracked;
///
/// ReactiveRuntime::scope(|| {
///     let tracked = Tracked::new(&42).unwrap();
///     assert_eq!(tracked.get().unwrap(), 42);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    context: Mutex<ReactiveContext>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
}

/// Restores the previous observer when a tracked computation finishes or unwinds.
struct ObserverGuard<'a> {
    runtime: &'a ReactiveRuntime,
    prev: Option<usize>,
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        lock(&self.runtime.context).current_observer = self.prev;
    }
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            context: Mutex::new(ReactiveContext::new()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// The runtime and all its state is dropped when the function returns, unless
    /// something created inside still holds it.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(), f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Arc<Self> {
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current reactive runtime (scoped or global fallback).
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| stack.borrow_mut().push(runtime));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Generate the next unique ID for a node or observer.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Track a read of a node by the current observer.
    pub fn track_read(&self, node_id: usize) {
        let mut ctx = lock(&self.context);
        if let Some(current_observer) = ctx.current_observer {
            ctx.dependencies
                .entry(node_id)
                .or_default()
                .insert(current_observer);
            ctx.observer_deps
                .entry(current_observer)
                .or_default()
                .insert(node_id);
        }
    }

    /// Whether a tracked computation is currently running.
    pub fn is_tracking(&self) -> bool {
        lock(&self.context).current_observer.is_some()
    }

    /// Notify the observers of several nodes, running each observer at most once.
    ///
    /// Observers run in the order they are first reached, with no lock held.
    pub fn notify_many(&self, node_ids: &[usize]) {
        let pending: Vec<Observer> = {
            let ctx = lock(&self.context);
            let mut seen = HashSet::new();
            let mut pending = Vec::new();
            for node_id in node_ids {
                let Some(observers) = ctx.dependencies.get(node_id) else {
                    continue;
                };
                let mut ids: Vec<usize> = observers.iter().copied().collect();
                ids.sort_unstable();
                for observer_id in ids {
                    if seen.insert(observer_id) {
                        if let Some(observer) = ctx.observers.get(&observer_id) {
                            pending.push(Arc::clone(observer));
                        }
                    }
                }
            }
            pending
        };

        if !pending.is_empty() {
            tracing::trace!(nodes = node_ids.len(), observers = pending.len(), "notifying observers");
        }
        for observer in pending {
            observer();
        }
    }

    /// Register an observer function, replacing any previous registration for the ID.
    pub fn create_observer<F>(&self, observer_id: usize, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut ctx = lock(&self.context);
        ctx.untrack_observer(observer_id);
        ctx.observers.insert(observer_id, Arc::new(f));
    }

    /// Drop every dependency an observer recorded, ahead of a re-run.
    pub fn clear_dependencies(&self, observer_id: usize) {
        lock(&self.context).untrack_observer(observer_id);
    }

    /// Remove an observer and all of its dependencies.
    pub fn remove_observer(&self, observer_id: usize) {
        let mut ctx = lock(&self.context);
        ctx.observers.remove(&observer_id);
        ctx.untrack_observer(observer_id);
    }

    /// Number of observers currently depending on a node.
    pub fn observer_count(&self, node_id: usize) -> usize {
        lock(&self.context)
            .dependencies
            .get(&node_id)
            .map_or(0, HashSet::len)
    }

    /// Run a function with a specific observer as the current context.
    pub fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = lock(&self.context).current_observer.replace(observer_id);
        let _guard = ObserverGuard { runtime: self, prev };
        f()
    }

    /// Run a function without tracking any reads it performs.
    pub fn untrack<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = lock(&self.context).current_observer.take();
        let _guard = ObserverGuard { runtime: self, prev };
        f()
    }
}
