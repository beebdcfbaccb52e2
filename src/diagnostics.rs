//! Engine-level faults and the process-wide diagnostic hook.
//!
//! An [`InternalError`] means the engine was misused (settling a cell
//! that already settled, for instance). It is never surfaced as a
//! rejection: it is reported through the hook and the operation is
//! abandoned.

use crate::State;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

type Hook = Arc<dyn Fn(&InternalError) + Send + Sync>;

lazy_static! {
    static ref HOOK: RwLock<Hook> = RwLock::new(Arc::new(|_| {}));
}

/// Replace the process-wide diagnostic handler. Last writer wins; there
/// is no ordering guarantee relative to in-flight settlements. The
/// default handler does nothing.
pub fn set_diagnostic_hook<F>(hook: F)
where
    F: Fn(&InternalError) + Send + Sync + 'static,
{
    *HOOK.write() = Arc::new(hook);
}

pub(crate) fn report(error: &InternalError) {
    // The handler runs outside the guard; a hook may swap the hook.
    let hook = HOOK.read().clone();
    hook(error);
}

/// A settlement operation was attempted on a cell that had already left
/// the pending state. Reported to the diagnostic hook once on creation
/// and again wherever a dispatch boundary traps one.
#[derive(Debug, Clone, Error)]
#[error("attempted to {op} a promise that is already {state:?}")]
pub struct InternalError {
    pub op: &'static str,
    pub state: State,
}

impl InternalError {
    pub(crate) fn new(op: &'static str, state: State) -> Self {
        let error = InternalError { op, state };
        report(&error);
        error
    }
}

/// The hook is process-global; tests that install one take turns on this.
#[cfg(test)]
pub(crate) fn hook_serial() -> &'static parking_lot::Mutex<()> {
    static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
    &SERIAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Outcome, Promise};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_repeated_settlement_reports_once() {
        let _turn = hook_serial().lock();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        set_diagnostic_hook(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let (promise, settler) = Promise::pending();
        settler.fulfill(1i32);
        settler.fulfill(2i32);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*promise.value().unwrap().downcast::<i32>().unwrap(), 1);

        set_diagnostic_hook(|_| {});
    }

    #[test]
    fn test_trapped_at_dispatch_boundary_reports_again() {
        let _turn = hook_serial().lock();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        set_diagnostic_hook(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let (_promise, settler) = Promise::pending();
        settler.fulfill(1i32);
        // The resolver is a dispatch boundary: once at creation, once trapped.
        settler.resolve(Outcome::value(2i32));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        set_diagnostic_hook(|_| {});
    }

    #[test]
    fn test_hook_observes_op_and_state() {
        let _turn = hook_serial().lock();
        let last = Arc::new(parking_lot::Mutex::new(None));
        let seen = last.clone();
        set_diagnostic_hook(move |error| {
            *seen.lock() = Some((error.op, error.state));
        });

        let (_promise, settler) = Promise::pending();
        settler.forever_pending();
        settler.reject(crate::Rejection::from_reason("late"));
        assert_eq!(*last.lock(), Some(("reject", State::ForeverPending)));

        set_diagnostic_hook(|_| {});
    }
}
