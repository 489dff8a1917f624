use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::runtime::{current_scope, ReactiveRuntime, Scope};
use crate::sync::{lock, RunGate};

struct EffectInner {
    id: usize,
    runtime: Weak<ReactiveRuntime>,
    owner: Option<Scope>,
    // Scope of the latest run; disposed before the next run starts
    run_scope: Mutex<Option<Scope>>,
    run: Box<dyn Fn() + Send + Sync>,
    runs: AtomicUsize,
    disposed: AtomicBool,
    // Re-runs requested during a run wait for it to finish
    gate: RunGate,
}

impl EffectInner {
    fn execute(&self) {
        self.gate.run(|| self.run_once());
    }

    fn run_once(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };

        if let Some(previous) = lock(&self.run_scope).take() {
            previous.dispose();
        }
        let scope = match &self.owner {
            Some(owner) => owner.child(),
            None => Scope::detached(),
        };
        *lock(&self.run_scope) = Some(scope.clone());

        runtime.clear_dependencies(self.id);
        self.runs.fetch_add(1, Ordering::SeqCst);
        ReactiveRuntime::with_runtime(Arc::clone(&runtime), || {
            runtime.with_observer(self.id, || scope.run(|| (self.run)()));
        });
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
        if let Some(scope) = lock(&self.run_scope).take() {
            scope.dispose();
        }
    }
}

/// A rendering computation that re-runs when the tracked values it reads change.
///
/// Effects run immediately to establish their dependencies. Each run gets its own
/// child scope, so cleanups and bindings created during a run are released before
/// the next one. A change the effect causes during its own run schedules one more
/// run after the current one returns. The effect lives until the scope it was created in is disposed,
/// or until [`Effect::dispose`] is called.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use tincan_bind::{create_effect, Tracked};
///
/// let tracked = Tracked::new(&5).unwrap();
/// let last = Arc::new(AtomicUsize::new(0));
///
/// let effect = create_effect({
///     let tracked = tracked.clone();
///     let last = last.clone();
///     move || last.store(tracked.get().unwrap(), Ordering::SeqCst)
/// });
/// assert_eq!(last.load(Ordering::SeqCst), 5);
///
/// tracked.reconcile(&10).unwrap();
/// assert_eq!(last.load(Ordering::SeqCst), 10);
/// assert_eq!(effect.run_count(), 2);
/// effect.dispose();
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it once.
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        let owner = current_scope();

        let inner = Arc::new(EffectInner {
            id,
            runtime: Arc::downgrade(&runtime),
            owner: owner.clone(),
            run_scope: Mutex::new(None),
            run: Box::new(effect),
            runs: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            gate: RunGate::default(),
        });

        let observer = Arc::clone(&inner);
        runtime.create_observer(id, move || observer.execute());

        if let Some(owner) = owner {
            let disposer = Arc::clone(&inner);
            owner.add_cleanup(Box::new(move || disposer.dispose()));
        }

        inner.execute();
        Self { inner }
    }

    /// How many times the effect has run, including the initial run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.load(Ordering::SeqCst)
    }

    /// Stop the effect and dispose the scope of its latest run.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

/// Create a new effect that runs now and whenever its dependencies change.
pub fn create_effect<F>(effect: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(effect)
}
