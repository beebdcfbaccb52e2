//! The erased view: payloads and rejection reasons are `Any`.

use crate::cell::{Cell, Rejection, State};
use crate::dispatch::{subscribe, DispatcherRef, FulfillHandler, RejectHandler};
use crate::factory::{self, ViewFactory};
use crate::light::Light;
use crate::outcome::{resolve_outcome, Outcome};
use crate::typed::Typed;
use crate::{Fault, Payload, WaitError};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// A clonable handle onto the eventual outcome of a computation.
///
/// Any number of handles may observe the same cell; settlement happens
/// exactly once, through the [`Controller`] returned by [`Promise::pending`].
///
/// # Examples
///
/// ```
/// use promise_cell::{Outcome, Promise};
///
/// let doubled = Promise::fulfilled(21i32).on_fulfilled(|value| {
///     let n = *value.downcast::<i32>().unwrap();
///     Ok(Outcome::value(n * 2))
/// });
/// assert_eq!(*doubled.value().unwrap().downcast::<i32>().unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct Promise {
    cell: Arc<Cell>,
}

impl ViewFactory for Promise {
    fn from_cell(cell: Arc<Cell>) -> Self {
        Promise { cell }
    }

    fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }
}

impl Promise {
    /// An already-fulfilled promise carrying `value`.
    pub fn fulfilled<T: Any + Send + Sync>(value: T) -> Self {
        factory::fulfilled_view(Arc::new(value))
    }

    pub fn from_payload(payload: Payload) -> Self {
        factory::fulfilled_view(payload)
    }

    /// An already-rejected promise.
    pub fn rejected(rejection: Rejection) -> Self {
        factory::rejected_view(rejection)
    }

    /// A promise that will never settle. Attaching continuations to it
    /// never runs them; blocking on it without a timeout never returns.
    pub fn forever_pending() -> Self {
        factory::forever_pending_view()
    }

    /// A live pending promise plus its settlement controller.
    pub fn pending() -> (Self, Controller) {
        let (promise, cell) = factory::pending_view::<Promise>();
        (promise, Controller::new(cell))
    }

    pub fn state(&self) -> State {
        self.cell.state()
    }

    /// Some only while fulfilled.
    pub fn value(&self) -> Option<Payload> {
        self.cell.fulfilled_value()
    }

    /// Some only while rejected.
    pub fn rejection(&self) -> Option<Rejection> {
        self.cell.rejection()
    }

    /// Block the calling thread until this promise settles.
    pub fn wait(&self) -> Result<Payload, WaitError> {
        self.cell.wait()
    }

    /// Block with a deadline. The timeout bounds only this waiter; the
    /// promise may still settle later and other waiters are unaffected.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Payload, WaitError> {
        self.cell.wait_timeout(timeout)
    }

    /// Attach continuations and return the promise for their result.
    ///
    /// A side left `None` passes the matching settlement through
    /// unchanged. With no dispatcher, continuations run inline: on this
    /// thread if the source has already settled, on the settling thread
    /// otherwise. `then` itself never blocks.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Outcome, Promise, Rejection};
    ///
    /// let recovered = Promise::rejected(Rejection::from_reason("nope"))
    ///     .on_rejected(|_rejection| Ok(Outcome::value("fallback")));
    /// assert_eq!(*recovered.value().unwrap().downcast::<&str>().unwrap(), "fallback");
    /// ```
    pub fn then(
        &self,
        dispatcher: Option<DispatcherRef>,
        on_fulfilled: Option<FulfillHandler>,
        on_rejected: Option<RejectHandler>,
    ) -> Promise {
        Promise::from_cell(subscribe(&self.cell, dispatcher, on_fulfilled, on_rejected))
    }

    /// `then` with only a fulfillment continuation, run inline.
    pub fn on_fulfilled<F>(&self, handler: F) -> Promise
    where
        F: FnOnce(Payload) -> Result<Outcome, Fault> + Send + 'static,
    {
        self.then(None, Some(Box::new(handler)), None)
    }

    /// `then` with only a rejection continuation, run inline.
    pub fn on_rejected<F>(&self, handler: F) -> Promise
    where
        F: FnOnce(Rejection) -> Result<Outcome, Fault> + Send + 'static,
    {
        self.then(None, None, Some(Box::new(handler)))
    }

    pub fn to_typed<T>(&self) -> Typed<T> {
        factory::convert(self)
    }

    pub fn to_light(&self) -> Light {
        factory::convert(self)
    }
}

impl Future for Promise {
    type Output = Result<Payload, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.cell.poll_settled(cx)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}

/// Settles one pending promise, at most once.
///
/// Repeated settlement attempts report the internal-error condition to
/// the diagnostic hook and leave the cell untouched. Dropping a
/// controller that was never used marks its still-pending promise
/// forever-pending: an abandoned producer is a permanent non-result.
pub struct Controller {
    pub(crate) cell: Arc<Cell>,
    engaged: AtomicBool,
}

impl Controller {
    pub(crate) fn new(cell: Arc<Cell>) -> Self {
        Controller {
            cell,
            engaged: AtomicBool::new(false),
        }
    }

    /// Settlement duty has been exercised; dropping this controller is no
    /// longer an abandonment. Resolving with a pending promise or a
    /// thenable settles the cell later, without the controller.
    fn engage(&self) {
        self.engaged.store(true, Ordering::Release);
    }

    /// Feed a continuation-style outcome through the unwrapping resolver:
    /// resolving with a promise delegates, with a thenable adopts it, with
    /// a value fulfills directly.
    pub fn resolve(&self, outcome: Outcome) {
        self.engage();
        resolve_outcome(outcome, self.cell.clone());
    }

    pub fn fulfill<T: Any + Send + Sync>(&self, value: T) {
        self.fulfill_payload(Arc::new(value));
    }

    pub fn fulfill_payload(&self, payload: Payload) {
        self.engage();
        let _ = self.cell.fulfill(payload);
    }

    pub fn reject(&self, rejection: Rejection) {
        self.engage();
        let _ = self.cell.reject(rejection);
    }

    /// Mark the promise as never settling.
    pub fn forever_pending(&self) {
        self.engage();
        let _ = self.cell.forever_pending();
    }

    /// Another handle onto the promise this controller settles.
    pub fn promise(&self) -> Promise {
        Promise::from_cell(self.cell.clone())
    }
}

impl Drop for Controller {
    /// An unsettled promise whose producer walked away can never settle.
    fn drop(&mut self) {
        if !self.engaged.load(Ordering::Acquire) {
            self.cell.forever_pending_quietly();
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.cell.state())
            .finish()
    }
}
