//! The lightweight view: one aggregate callback per attachment.
//!
//! Where the other views split continuations into a fulfillment and a
//! rejection side, `Light` hands the whole [`Resolution`] to a single
//! callback. Same cell, same engine; only the callback shape differs.

use crate::cell::{Cell, Rejection, State};
use crate::dispatch::{subscribe, DispatcherRef, FulfillHandler, RejectHandler};
use crate::erased::{Controller, Promise};
use crate::factory::{self, ViewFactory};
use crate::outcome::{Outcome, Resolution};
use crate::typed::Typed;
use crate::{Fault, Payload, WaitError};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A promise observed through one settlement callback.
///
/// # Examples
///
/// ```
/// use promise_cell::{Light, Outcome, Resolution};
///
/// let seen = Light::fulfilled(3i32).when_settled(None, |resolution| {
///     match resolution {
///         Resolution::Fulfilled(value) => {
///             let n = *value.downcast::<i32>().unwrap();
///             Ok(Outcome::value(n + 1))
///         }
///         Resolution::Rejected(rejection) => Ok(Outcome::rejected(rejection)),
///     }
/// });
/// assert_eq!(*seen.wait().unwrap().downcast::<i32>().unwrap(), 4);
/// ```
#[derive(Clone)]
pub struct Light {
    cell: Arc<Cell>,
}

impl ViewFactory for Light {
    fn from_cell(cell: Arc<Cell>) -> Self {
        Light { cell }
    }

    fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }
}

impl Light {
    pub fn fulfilled<T: Any + Send + Sync>(value: T) -> Self {
        factory::fulfilled_view(Arc::new(value))
    }

    pub fn rejected(rejection: Rejection) -> Self {
        factory::rejected_view(rejection)
    }

    pub fn forever_pending() -> Self {
        factory::forever_pending_view()
    }

    pub fn pending() -> (Self, Controller) {
        let (promise, cell) = factory::pending_view::<Light>();
        (promise, Controller::new(cell))
    }

    pub fn state(&self) -> State {
        self.cell.state()
    }

    pub fn value(&self) -> Option<Payload> {
        self.cell.fulfilled_value()
    }

    pub fn rejection(&self) -> Option<Rejection> {
        self.cell.rejection()
    }

    pub fn wait(&self) -> Result<Payload, WaitError> {
        self.cell.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<Payload, WaitError> {
        self.cell.wait_timeout(timeout)
    }

    /// Attach one callback observing the whole settlement. Forever-pending
    /// sources propagate without the callback ever running.
    pub fn when_settled<F>(&self, dispatcher: Option<DispatcherRef>, callback: F) -> Light
    where
        F: FnOnce(Resolution) -> Result<Outcome, Fault> + Send + 'static,
    {
        // Both engine sides funnel into the one callback; the cell settles
        // once, so the slot is taken at most once.
        let slot = Arc::new(Mutex::new(Some(callback)));
        let taken = slot.clone();
        let on_fulfilled: FulfillHandler = Box::new(move |value| match taken.lock().take() {
            Some(callback) => callback(Resolution::Fulfilled(value)),
            None => Ok(Outcome::from_payload(value)),
        });
        let on_rejected: RejectHandler = Box::new(move |rejection| match slot.lock().take() {
            Some(callback) => callback(Resolution::Rejected(rejection)),
            None => Ok(Outcome::rejected(rejection)),
        });
        Light::from_cell(subscribe(
            &self.cell,
            dispatcher,
            Some(on_fulfilled),
            Some(on_rejected),
        ))
    }

    pub fn to_erased(&self) -> Promise {
        factory::convert(self)
    }

    pub fn to_typed<T>(&self) -> Typed<T> {
        factory::convert(self)
    }
}

impl fmt::Debug for Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Light")
            .field("state", &self.cell.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_callback_sees_rejection_aggregate() {
        let (promise, settler) = Light::pending();
        let observed = promise.when_settled(None, |resolution| {
            Ok(Outcome::value(resolution.is_fulfilled()))
        });
        settler.reject(Rejection::from_reason("no"));
        assert_eq!(*observed.wait().unwrap().downcast::<bool>().unwrap(), false);
    }

    #[test]
    fn test_forever_pending_skips_the_callback() {
        let observed = Light::forever_pending().when_settled(None, |_resolution| {
            panic!("must never run");
        });
        assert_eq!(observed.state(), State::ForeverPending);
    }
}
