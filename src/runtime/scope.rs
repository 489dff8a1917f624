use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

/// Cleanup function run when a scope is disposed.
pub type Cleanup = Box<dyn FnOnce() + Send>;

thread_local! {
    /// Innermost scope activated with [`Scope::run`] on this thread.
    static ACTIVE_SCOPE: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

fn set_active_scope(scope: Option<Scope>) -> Option<Scope> {
    ACTIVE_SCOPE.with(|active| active.replace(scope))
}

/// Get the scope that is active on this thread, if any.
pub fn current_scope() -> Option<Scope> {
    ACTIVE_SCOPE.with(|active| active.borrow().clone())
}

struct ActiveScopeGuard {
    prev: Option<Scope>,
}

impl Drop for ActiveScopeGuard {
    fn drop(&mut self) {
        set_active_scope(self.prev.take());
    }
}

struct ScopeInner {
    disposed: AtomicBool,
    cleanups: Mutex<Vec<Cleanup>>,
    children: Mutex<Vec<Arc<ScopeInner>>>,
    parent: Option<Weak<ScopeInner>>,
}

impl ScopeInner {
    fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let children: Vec<_> = lock(&self.children).drain(..).collect();
        for child in children {
            child.dispose();
        }

        // Reverse registration order, so later cleanups see earlier resources alive
        let cleanups: Vec<_> = lock(&self.cleanups).drain(..).collect();
        tracing::debug!(cleanups = cleanups.len(), "disposing scope");
        for cleanup in cleanups.into_iter().rev() {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup)).is_err() {
                tracing::error!("scope cleanup panicked");
            }
        }

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            lock(&parent.children).retain(|child| !Arc::ptr_eq(child, self));
        }
    }
}

/// An owner of cleanups, disposed once when the computation it belongs to ends.
///
/// Scopes nest: a scope created while another one is active becomes its child and
/// is disposed along with it. Bindings and effects register their teardown with the
/// active scope through [`on_cleanup`].
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use tincan_bind::runtime::{create_root, on_cleanup};
///
/// let cleaned = Arc::new(AtomicBool::new(false));
/// let flag = cleaned.clone();
/// let scope = create_root(|scope| {
///     on_cleanup(move || flag.store(true, Ordering::SeqCst));
///     scope
/// });
///
/// scope.dispose();
/// assert!(cleaned.load(Ordering::SeqCst));
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a scope owned by the active scope, or a root scope if none is active.
    pub fn new() -> Self {
        match current_scope() {
            Some(parent) if !parent.is_disposed() => parent.child(),
            _ => Self::detached(),
        }
    }

    /// Create a scope with no parent.
    pub fn detached() -> Self {
        Self::with_parent(None)
    }

    /// Create a child scope disposed together with this one.
    pub fn child(&self) -> Self {
        let child = Self::with_parent(Some(Arc::downgrade(&self.inner)));
        lock(&self.inner.children).push(Arc::clone(&child.inner));
        child
    }

    fn with_parent(parent: Option<Weak<ScopeInner>>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                disposed: AtomicBool::new(false),
                cleanups: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
                parent,
            }),
        }
    }

    /// Run a function with this scope active.
    ///
    /// Returns `None` without running `f` if the scope was already disposed.
    pub fn run<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        if self.is_disposed() {
            return None;
        }
        let _guard = ActiveScopeGuard {
            prev: set_active_scope(Some(self.clone())),
        };
        Some(f())
    }

    /// Register a cleanup with this scope.
    ///
    /// A cleanup added after disposal runs immediately.
    pub fn add_cleanup(&self, cleanup: Cleanup) {
        if self.is_disposed() {
            cleanup();
            return;
        }
        lock(&self.inner.cleanups).push(cleanup);
    }

    /// Dispose child scopes, then run this scope's cleanups in reverse order.
    ///
    /// Only the first call has any effect.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of cleanups waiting for disposal.
    pub fn cleanup_count(&self) -> usize {
        lock(&self.inner.cleanups).len()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` inside a new root scope and hand it the scope so the caller decides
/// when to dispose it.
pub fn create_root<F, R>(f: F) -> R
where
    F: FnOnce(Scope) -> R,
{
    let scope = Scope::detached();
    let _guard = ActiveScopeGuard {
        prev: set_active_scope(Some(scope.clone())),
    };
    f(scope)
}

/// Register a cleanup with the active scope.
///
/// Returns `false` when no scope is active; the cleanup is then dropped and will
/// never run.
pub fn on_cleanup<F>(f: F) -> bool
where
    F: FnOnce() + Send + 'static,
{
    match current_scope() {
        Some(scope) => {
            scope.add_cleanup(Box::new(f));
            true
        }
        None => {
            tracing::warn!("cleanup registered outside a scope will never run");
            false
        }
    }
}
