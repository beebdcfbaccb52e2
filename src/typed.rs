//! The statically typed view: casts live at the boundary only.
//!
//! `Typed<T>` wraps the same cell as every other view; the phantom type
//! says what the fulfillment payload is expected to hold. A payload that
//! fails the downcast rejects the downstream promise with
//! [`TypeMismatch`](crate::TypeMismatch) rather than panicking.

use crate::cell::{Cell, Rejection, State};
use crate::dispatch::{subscribe, DispatcherRef, FulfillHandler, RejectHandler};
use crate::erased::{Controller, Promise};
use crate::factory::{self, ViewFactory};
use crate::light::Light;
use crate::outcome::{Outcome, Resolution, Thenable};
use crate::{Fault, Payload, TypeMismatch, WaitError};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// A promise whose fulfillment payload is expected to be a `T`.
///
/// # Examples
///
/// ```
/// use promise_cell::typed::Typed;
/// use std::thread;
///
/// let (promise, settler) = Typed::<String>::pending();
/// let producer = thread::spawn(move || settler.fulfill("hi".to_string()));
/// assert_eq!(*promise.wait().unwrap(), "hi");
/// producer.join().expect("The producer thread has panicked.");
/// ```
///
/// A typed promise is a `Future`:
///
/// ```
/// use futures::executor::block_on;
/// use promise_cell::typed::Typed;
/// use std::thread;
///
/// let (promise, settler) = Typed::<i32>::pending();
/// let waiter = thread::spawn(move || block_on(async move { promise.await }));
/// settler.fulfill(7);
/// assert_eq!(*waiter.join().unwrap().unwrap(), 7);
/// ```
pub struct Typed<T> {
    cell: Arc<Cell>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        Typed {
            cell: self.cell.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> ViewFactory for Typed<T> {
    fn from_cell(cell: Arc<Cell>) -> Self {
        Typed {
            cell,
            _value: PhantomData,
        }
    }

    fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }
}

impl<T: Any + Send + Sync> Typed<T> {
    pub fn fulfilled(value: T) -> Self {
        factory::fulfilled_view(Arc::new(value))
    }

    pub fn rejected(rejection: Rejection) -> Self {
        factory::rejected_view(rejection)
    }

    pub fn forever_pending() -> Self {
        factory::forever_pending_view()
    }

    pub fn pending() -> (Self, TypedController<T>) {
        let (promise, cell) = factory::pending_view::<Typed<T>>();
        (
            promise,
            TypedController {
                inner: Controller::new(cell),
                _value: PhantomData,
            },
        )
    }

    pub fn state(&self) -> State {
        self.cell.state()
    }

    /// Some only while fulfilled with a `T`.
    pub fn value(&self) -> Option<Arc<T>> {
        self.cell
            .fulfilled_value()
            .and_then(|payload| payload.downcast::<T>().ok())
    }

    pub fn rejection(&self) -> Option<Rejection> {
        self.cell.rejection()
    }

    pub fn wait(&self) -> Result<Arc<T>, WaitError> {
        downcast(self.cell.wait()?)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<Arc<T>, WaitError> {
        downcast(self.cell.wait_timeout(timeout)?)
    }

    /// Attach typed continuations; see the erased
    /// [`then`](crate::Promise::then) for the dispatch rules, which are
    /// identical. The fulfillment side only differs by the boundary cast:
    /// a payload that is not a `T` rejects the downstream promise with a
    /// type mismatch instead of invoking the callback.
    pub fn then<U, F, R>(
        &self,
        dispatcher: Option<DispatcherRef>,
        on_fulfilled: Option<F>,
        on_rejected: Option<R>,
    ) -> Typed<U>
    where
        U: Any + Send + Sync,
        F: FnOnce(Arc<T>) -> Result<TypedOutcome<U>, Fault> + Send + 'static,
        R: FnOnce(Rejection) -> Result<TypedOutcome<U>, Fault> + Send + 'static,
    {
        let on_fulfilled = on_fulfilled.map(|handler| -> FulfillHandler {
            Box::new(move |payload: Payload| {
                let value = payload
                    .downcast::<T>()
                    .map_err(|_| Arc::new(TypeMismatch::new::<T>()) as Fault)?;
                handler(value).map(TypedOutcome::into_outcome)
            })
        });
        let on_rejected = on_rejected.map(|handler| -> RejectHandler {
            Box::new(move |rejection| handler(rejection).map(TypedOutcome::into_outcome))
        });
        Typed::from_cell(subscribe(&self.cell, dispatcher, on_fulfilled, on_rejected))
    }

    /// `then` with only a fulfillment continuation, run inline.
    pub fn on_fulfilled<U, F>(&self, handler: F) -> Typed<U>
    where
        U: Any + Send + Sync,
        F: FnOnce(Arc<T>) -> Result<TypedOutcome<U>, Fault> + Send + 'static,
    {
        self.then(
            None,
            Some(handler),
            None::<fn(Rejection) -> Result<TypedOutcome<U>, Fault>>,
        )
    }

    /// `then` with only a rejection continuation, run inline.
    pub fn on_rejected<F>(&self, handler: F) -> Typed<T>
    where
        F: FnOnce(Rejection) -> Result<TypedOutcome<T>, Fault> + Send + 'static,
    {
        self.then(
            None,
            None::<fn(Arc<T>) -> Result<TypedOutcome<T>, Fault>>,
            Some(handler),
        )
    }

    pub fn to_erased(&self) -> Promise {
        factory::convert(self)
    }

    pub fn to_light(&self) -> Light {
        factory::convert(self)
    }
}

fn downcast<T: Any + Send + Sync>(payload: Payload) -> Result<Arc<T>, WaitError> {
    payload
        .downcast::<T>()
        .map_err(|_| TypeMismatch::new::<T>().into())
}

impl<T: Any + Send + Sync> Future for Typed<T> {
    type Output = Result<Arc<T>, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.cell.poll_settled(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => Poll::Ready(result.and_then(downcast::<T>)),
        }
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed")
            .field("state", &self.cell.state())
            .finish()
    }
}

/// Outcome of a typed continuation: phantom-typed over the erased outcome.
pub struct TypedOutcome<U> {
    outcome: Outcome,
    _value: PhantomData<fn() -> U>,
}

impl<U: Any + Send + Sync> TypedOutcome<U> {
    /// A plain value.
    pub fn of(value: U) -> Self {
        TypedOutcome::from_outcome(Outcome::value(value))
    }

    /// Delegate to another typed promise.
    pub fn promise(promise: &Typed<U>) -> Self {
        TypedOutcome::from_outcome(Outcome::typed(promise))
    }

    pub fn thenable<T: Thenable + 'static>(thenable: T) -> Self {
        TypedOutcome::from_outcome(Outcome::thenable(thenable))
    }

    /// An explicit settlement, taken as-is. The payload is not checked
    /// against `U`; a mismatch surfaces at the next typed boundary.
    pub fn resolution(resolution: Resolution) -> Self {
        TypedOutcome::from_outcome(Outcome::resolution(resolution))
    }

    fn from_outcome(outcome: Outcome) -> Self {
        TypedOutcome {
            outcome,
            _value: PhantomData,
        }
    }

    pub(crate) fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

/// Typed settlement controller; the typed face of [`Controller`].
pub struct TypedController<T> {
    inner: Controller,
    _value: PhantomData<fn(T)>,
}

impl<T: Any + Send + Sync> TypedController<T> {
    pub fn fulfill(&self, value: T) {
        self.inner.fulfill_payload(Arc::new(value));
    }

    pub fn reject(&self, rejection: Rejection) {
        self.inner.reject(rejection);
    }

    pub fn forever_pending(&self) {
        self.inner.forever_pending();
    }

    pub fn resolve(&self, outcome: TypedOutcome<T>) {
        self.inner.resolve(outcome.into_outcome());
    }

    pub fn promise(&self) -> Typed<T> {
        Typed::from_cell(self.inner.cell.clone())
    }
}

impl<T> fmt::Debug for TypedController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedController")
            .field("state", &self.inner.cell.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Promise, WaitError};
    use futures::executor::block_on;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_typed_chain() {
        let tripled = Typed::fulfilled(4i32).on_fulfilled(|n| Ok(TypedOutcome::of(*n * 3)));
        assert_eq!(*tripled.value().unwrap(), 12);
    }

    #[test]
    fn test_downcast_mismatch_rejects_downstream() {
        let promise = Promise::fulfilled("not a number".to_string()).to_typed::<i32>();
        let downstream = promise.on_fulfilled(|n| Ok(TypedOutcome::of(*n + 1)));
        assert_eq!(downstream.state(), State::Rejected);
        let rejection = downstream.rejection().unwrap();
        assert!(rejection.error().unwrap().to_string().contains("i32"));
    }

    #[test]
    fn test_typed_wait_mismatch() {
        let promise = Promise::fulfilled(1u8).to_typed::<String>();
        assert!(matches!(promise.wait(), Err(WaitError::Mismatch(_))));
    }

    #[test]
    fn test_resolve_delegates_to_another_promise() {
        let (promise, settler) = Typed::<i32>::pending();
        settler.resolve(TypedOutcome::promise(&Typed::fulfilled(8)));
        assert_eq!(*promise.value().unwrap(), 8);
    }

    #[test]
    fn test_controller_drop_marks_forever_pending() {
        let (promise, settler) = Typed::<i32>::pending();
        drop(settler);
        assert_eq!(promise.state(), State::ForeverPending);
        assert!(matches!(
            promise.wait_timeout(Duration::from_millis(20)),
            Err(WaitError::Timeout)
        ));
    }

    #[test]
    fn test_two_async_consumers_one_settlement() {
        let (promise, settler) = Typed::<String>::pending();
        let other = promise.clone();
        let waiter_a = thread::spawn(move || block_on(async move { promise.await }));
        let waiter_b = thread::spawn(move || block_on(async move { other.await }));
        thread::sleep(Duration::from_millis(10));
        settler.fulfill("shared".to_string());
        assert_eq!(*waiter_a.join().unwrap().unwrap(), "shared");
        assert_eq!(*waiter_b.join().unwrap().unwrap(), "shared");
    }
}
