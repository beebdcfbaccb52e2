//! What a continuation handed back, and how it resolves into a cell.
//!
//! Classification happens at construction: an [`Outcome`] is a closed set
//! of shapes, so [`resolve_outcome`] is one exhaustive match instead of an
//! open-ended chain of runtime type tests.

use crate::cell::{Cell, Rejection};
use crate::dispatch::{attach_delegate, trap};
use crate::erased::Promise;
use crate::factory::ViewFactory;
use crate::light::Light;
use crate::typed::Typed;
use crate::{Fault, Payload};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An explicit, already-computed settlement. Producers use it to fulfill
/// with an aggregate value without any further unwrapping; the light view
/// hands the same type to its callback as the settled aggregate.
pub enum Resolution {
    Fulfilled(Payload),
    Rejected(Rejection),
}

impl Resolution {
    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        Resolution::Fulfilled(Arc::new(value))
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Resolution::Fulfilled(_))
    }
}

/// What a continuation produced. Feeding one to a controller or returning
/// one from a `then` callback enters the unwrapping resolver, which keeps
/// going until a plain value or terminal settlement is reached.
pub struct Outcome(pub(crate) OutcomeKind);

pub(crate) enum OutcomeKind {
    /// A live promise handle, from any of the three views.
    Promise(Arc<Cell>),
    /// A duck-typed two-callback object.
    Thenable(Box<dyn Thenable>),
    /// An explicit settlement, taken as-is.
    Resolution(Resolution),
    /// A plain value; the terminal base case.
    Value(Payload),
}

impl Outcome {
    /// A plain value. Payloads are opaque: they are never re-inspected,
    /// so this always terminates the unwrap.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Outcome(OutcomeKind::Value(Arc::new(value)))
    }

    pub fn from_payload(payload: Payload) -> Self {
        Outcome(OutcomeKind::Value(payload))
    }

    /// Delegate to a live promise: the target settles however it does.
    pub fn promise(promise: &Promise) -> Self {
        Outcome(OutcomeKind::Promise(promise.cell().clone()))
    }

    pub fn typed<T>(promise: &Typed<T>) -> Self {
        Outcome(OutcomeKind::Promise(promise.cell().clone()))
    }

    pub fn light(promise: &Light) -> Self {
        Outcome(OutcomeKind::Promise(promise.cell().clone()))
    }

    pub fn thenable<T: Thenable + 'static>(thenable: T) -> Self {
        Outcome(OutcomeKind::Thenable(Box::new(thenable)))
    }

    pub fn resolution(resolution: Resolution) -> Self {
        Outcome(OutcomeKind::Resolution(resolution))
    }

    /// Shorthand for `resolution(Resolution::Fulfilled(..))`.
    pub fn fulfilled<T: Any + Send + Sync>(value: T) -> Self {
        Outcome::resolution(Resolution::of(value))
    }

    /// Shorthand for `resolution(Resolution::Rejected(..))`.
    pub fn rejected(rejection: Rejection) -> Self {
        Outcome::resolution(Resolution::Rejected(rejection))
    }
}

impl From<Promise> for Outcome {
    fn from(promise: Promise) -> Self {
        Outcome::promise(&promise)
    }
}

impl<T> From<Typed<T>> for Outcome {
    fn from(promise: Typed<T>) -> Self {
        Outcome::typed(&promise)
    }
}

impl From<Light> for Outcome {
    fn from(promise: Light) -> Self {
        Outcome::light(&promise)
    }
}

impl From<Resolution> for Outcome {
    fn from(resolution: Resolution) -> Self {
        Outcome::resolution(resolution)
    }
}

/// Duck-typed promise shape: anything exposing a two-callback `then`,
/// adopted structurally and invoked exactly once. The handles may be
/// called zero, one or many times; only the first settlement attempt
/// counts, and an error returned after a settlement attempt is ignored.
///
/// Closures of the right shape are thenables:
///
/// ```
/// use promise_cell::{Fault, Outcome, Promise, RejectHandle, ResolveHandle};
///
/// let (promise, settler) = Promise::pending();
/// settler.resolve(Outcome::thenable(
///     |resolve: ResolveHandle, _reject: RejectHandle| -> Result<(), Fault> {
///         resolve.resolve(Outcome::value(7i32));
///         Ok(())
///     },
/// ));
/// assert_eq!(*promise.value().unwrap().downcast::<i32>().unwrap(), 7);
/// ```
pub trait Thenable: Send {
    fn then(self: Box<Self>, resolve: ResolveHandle, reject: RejectHandle) -> Result<(), Fault>;
}

impl<F> Thenable for F
where
    F: FnOnce(ResolveHandle, RejectHandle) -> Result<(), Fault> + Send,
{
    fn then(self: Box<Self>, resolve: ResolveHandle, reject: RejectHandle) -> Result<(), Fault> {
        (*self)(resolve, reject)
    }
}

/// First of {resolve, reject, error-out-of-`then`} wins; later attempts
/// are silently ignored.
struct Gate {
    passed: AtomicBool,
    target: Arc<Cell>,
}

impl Gate {
    fn claim(&self) -> bool {
        !self.passed.swap(true, Ordering::AcqRel)
    }
}

/// The fulfillment half of a thenable invocation.
#[derive(Clone)]
pub struct ResolveHandle {
    gate: Arc<Gate>,
}

impl ResolveHandle {
    /// Accepts a full [`Outcome`]: resolving with another promise or
    /// thenable continues the unwrap rather than fulfilling verbatim.
    pub fn resolve(&self, outcome: Outcome) {
        if self.gate.claim() {
            resolve_outcome(outcome, self.gate.target.clone());
        }
    }
}

/// The rejection half of a thenable invocation.
#[derive(Clone)]
pub struct RejectHandle {
    gate: Arc<Gate>,
}

impl RejectHandle {
    pub fn reject(&self, rejection: Rejection) {
        if self.gate.claim() {
            trap(self.gate.target.reject(rejection));
        }
    }
}

pub(crate) fn invoke_thenable(thenable: Box<dyn Thenable>, target: Arc<Cell>) {
    let gate = Arc::new(Gate {
        passed: AtomicBool::new(false),
        target,
    });
    let resolve = ResolveHandle { gate: gate.clone() };
    let reject = RejectHandle { gate: gate.clone() };
    if let Err(fault) = thenable.then(resolve, reject) {
        if gate.claim() {
            trap(gate.target.reject(Rejection::from_fault(fault)));
        }
    }
}

/// Resolve whatever a continuation produced into `target`. Delegation
/// attaches continuations rather than descending, so the call stack stays
/// flat no matter how long the promise chain is.
pub(crate) fn resolve_outcome(outcome: Outcome, target: Arc<Cell>) {
    match outcome.0 {
        OutcomeKind::Promise(source) => attach_delegate(&source, target),
        OutcomeKind::Thenable(thenable) => invoke_thenable(thenable, target),
        OutcomeKind::Resolution(Resolution::Fulfilled(value)) => trap(target.fulfill(value)),
        OutcomeKind::Resolution(Resolution::Rejected(rejection)) => trap(target.reject(rejection)),
        OutcomeKind::Value(value) => trap(target.fulfill(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Promise, State, WaitError};
    use std::time::Duration;

    fn fault(message: &'static str) -> Fault {
        Arc::new(std::io::Error::new(std::io::ErrorKind::Other, message))
    }

    /// A deliberately misbehaving thenable: settles twice, then errors.
    struct Unruly;

    impl Thenable for Unruly {
        fn then(
            self: Box<Self>,
            resolve: ResolveHandle,
            _reject: RejectHandle,
        ) -> Result<(), Fault> {
            resolve.resolve(Outcome::value(5i32));
            resolve.resolve(Outcome::value(6i32));
            Err(fault("after the fact"))
        }
    }

    #[test]
    fn test_thenable_first_resolution_wins() {
        let (promise, settler) = Promise::pending();
        settler.resolve(Outcome::thenable(Unruly));
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(*promise.value().unwrap().downcast::<i32>().unwrap(), 5);
    }

    #[test]
    fn test_thenable_error_before_settlement_rejects() {
        let (promise, settler) = Promise::pending();
        settler.resolve(Outcome::thenable(
            |_resolve: ResolveHandle, _reject: RejectHandle| -> Result<(), Fault> {
                Err(fault("broke"))
            },
        ));
        let rejection = promise.rejection().unwrap();
        assert_eq!(rejection.error().unwrap().to_string(), "broke");
        // The fault rides in both slots.
        assert!(rejection.reason().is_some());
    }

    #[test]
    fn test_thenable_reject_beats_later_resolve() {
        let (promise, settler) = Promise::pending();
        settler.resolve(Outcome::thenable(
            |resolve: ResolveHandle, reject: RejectHandle| -> Result<(), Fault> {
                reject.reject(Rejection::from_reason("no"));
                resolve.resolve(Outcome::value(1i32));
                Ok(())
            },
        ));
        assert_eq!(promise.state(), State::Rejected);
    }

    #[test]
    fn test_flattening_terminates_on_first_plain_value() {
        let innermost = Promise::fulfilled(7i32);
        let (middle, middle_settler) = Promise::pending();
        middle_settler.resolve(Outcome::promise(&innermost));
        let (outer, outer_settler) = Promise::pending();
        outer_settler.resolve(Outcome::promise(&middle));
        assert_eq!(*outer.value().unwrap().downcast::<i32>().unwrap(), 7);
    }

    #[test]
    fn test_resolution_descriptor_is_taken_verbatim() {
        let (promise, settler) = Promise::pending();
        settler.resolve(Outcome::fulfilled((1i32, 2i32)));
        let pair = promise.value().unwrap().downcast::<(i32, i32)>().unwrap();
        assert_eq!(*pair, (1, 2));

        let (promise, settler) = Promise::pending();
        settler.resolve(Outcome::rejected(Rejection::from_reason("told you")));
        assert_eq!(promise.state(), State::Rejected);
    }

    #[test]
    fn test_resolving_with_forever_pending_propagates() {
        let (promise, settler) = Promise::pending();
        settler.resolve(Outcome::promise(&Promise::forever_pending()));
        assert_eq!(promise.state(), State::ForeverPending);
        assert!(matches!(
            promise.wait_timeout(Duration::from_millis(20)),
            Err(WaitError::Timeout)
        ));
    }

    #[test]
    fn test_delayed_delegation() {
        let (source, source_settler) = Promise::pending();
        let (target, target_settler) = Promise::pending();
        target_settler.resolve(Outcome::promise(&source));
        assert_eq!(target.state(), State::Pending);
        source_settler.fulfill(9i32);
        assert_eq!(*target.value().unwrap().downcast::<i32>().unwrap(), 9);
    }
}
