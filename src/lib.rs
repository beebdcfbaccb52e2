//! Settle-once promise cells.
//!
//! A promise is a handle onto the eventual outcome of a computation. A
//! producer settles it exactly once (fulfilled, rejected, or marked as
//! never going to settle) and any number of consumers attach
//! continuations, block, or `.await` without racing each other. All three
//! views of a promise (the erased [`Promise`], the statically typed
//! [`Typed`], the single-callback [`Light`]) share one settlement cell, so
//! converting between them never copies state.
//!
//! # Examples
//!
//! ```
//! use promise_cell::Promise;
//! use std::thread;
//!
//! let (promise, settler) = Promise::pending();
//! let producer = thread::spawn(move || settler.fulfill("ready".to_string()));
//! let value = promise.wait().unwrap();
//! assert_eq!(*value.downcast::<String>().unwrap(), "ready");
//! producer.join().expect("The producer thread has panicked.");
//! ```
//!
//! Chaining goes through [`Promise::then`] and friends. Whatever a
//! continuation returns (a plain value, another promise, a duck-typed
//! [`Thenable`], or an explicit [`Resolution`]) is unwrapped until a
//! terminal settlement is reached.

mod cell;
mod factory;

pub mod diagnostics;
pub mod dispatch;
pub mod erased;
pub mod light;
pub mod outcome;
pub mod typed;

pub use cell::{FaultReason, Rejection, State};
pub use diagnostics::{set_diagnostic_hook, InternalError};
pub use dispatch::{Dispatcher, DispatcherRef, FulfillHandler, Inline, Job, RejectHandler};
pub use erased::{Controller, Promise};
pub use light::Light;
pub use outcome::{Outcome, RejectHandle, Resolution, ResolveHandle, Thenable};
pub use typed::{Typed, TypedController, TypedOutcome};

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// The erased settlement payload every view stores.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A shareable error object carried by rejections.
pub type Fault = Arc<dyn std::error::Error + Send + Sync>;

/// Erase a value into a [`Payload`].
///
/// # Examples
///
/// ```
/// use promise_cell::payload;
/// let p = payload(7i32);
/// assert_eq!(*p.downcast::<i32>().unwrap(), 7);
/// ```
pub fn payload<T: Any + Send + Sync>(value: T) -> Payload {
    Arc::new(value)
}

/// Returned by the blocking and async wait operations. These are the only
/// places cell state turns back into a caller-visible error; everywhere
/// else rejections travel as settlement state.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    /// The awaited promise settled rejected.
    #[error("promise was rejected")]
    Rejected(Rejection),
    /// The deadline elapsed while the promise was still unsettled.
    #[error("timed out before the promise settled")]
    Timeout,
    /// Async observation of a promise that will never settle.
    #[error("promise will never settle")]
    NeverSettles,
    /// The fulfilled payload was not of the promised type.
    #[error(transparent)]
    Mismatch(#[from] TypeMismatch),
}

/// A fulfilled payload did not hold the type a typed view promised.
#[derive(Debug, Clone, Error)]
#[error("expected a payload of type {expected}")]
pub struct TypeMismatch {
    expected: &'static str,
}

impl TypeMismatch {
    pub(crate) fn new<T>() -> Self {
        TypeMismatch {
            expected: std::any::type_name::<T>(),
        }
    }
}
