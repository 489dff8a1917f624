//! Lock helpers that recover from poisoning, and a gate that keeps passes of
//! listener or effect work from overlapping.
//!
//! User closures (selectors, listeners, effects) may panic while the crate holds no
//! lock, but a panic that unwinds through a guard must not wedge every later read.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Runs passes of some work one at a time.
///
/// A request that arrives while a pass is in progress, from another thread or from
/// inside the pass itself, is folded into one more pass after the current one ends.
/// The caller that owns the gate runs every pass, so each pass must read the latest
/// state rather than anything captured with the request.
#[derive(Debug, Default)]
pub(crate) struct RunGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    running: bool,
    pending: bool,
}

impl RunGate {
    /// Returns `true` when this call ran at least one pass.
    pub(crate) fn run<F: FnMut()>(&self, mut pass: F) -> bool {
        {
            let mut state = lock(&self.state);
            if state.running {
                state.pending = true;
                return false;
            }
            state.running = true;
        }

        let _reset = ResetOnUnwind(self);
        loop {
            pass();
            let mut state = lock(&self.state);
            if !state.pending {
                state.running = false;
                return true;
            }
            state.pending = false;
        }
    }
}

struct ResetOnUnwind<'a>(&'a RunGate);

impl Drop for ResetOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *lock(&self.0.state) = GateState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;

    #[test]
    fn nested_requests_fold_into_one_more_pass() {
        let gate = Arc::new(RunGate::default());
        let passes = Arc::new(Mutex::new(0));

        let inner_gate = Arc::clone(&gate);
        let inner_passes = Arc::clone(&passes);
        assert!(gate.run(|| {
            let pass = {
                let mut passes = lock(&inner_passes);
                *passes += 1;
                *passes
            };
            if pass == 1 {
                assert!(!inner_gate.run(|| unreachable!()));
                assert!(!inner_gate.run(|| unreachable!()));
            }
        }));

        assert_eq!(*lock(&passes), 2);
    }

    #[test]
    fn panicking_pass_releases_the_gate() {
        let gate = RunGate::default();
        let result = catch_unwind(AssertUnwindSafe(|| gate.run(|| panic!("boom"))));
        assert!(result.is_err());

        let mut ran = false;
        assert!(gate.run(|| ran = true));
        assert!(ran);
    }
}
