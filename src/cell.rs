//! The resolution cell: one settle-once state machine per promise.
//!
//! Every view wraps an `Arc<Cell>`. The cell's mutex covers the state,
//! the continuation queue and the waker list together, and is only ever
//! held for O(1) bookkeeping; continuations, dispatcher submissions and
//! diagnostic-hook calls all run after it is released.

use crate::diagnostics::InternalError;
use crate::{Fault, Payload, WaitError};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Observable settlement state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
    /// Terminal marker: this promise will never fulfill or reject.
    ForeverPending,
}

/// Why a promise rejected. The application-level reason and the
/// underlying error are independent; either, both or neither may be set.
#[derive(Clone, Default)]
pub struct Rejection {
    reason: Option<Payload>,
    error: Option<Fault>,
}

impl Rejection {
    pub fn new(reason: Option<Payload>, error: Option<Fault>) -> Self {
        Rejection { reason, error }
    }

    /// A rejection carrying only an application-level reason.
    pub fn from_reason<T: Any + Send + Sync>(reason: T) -> Self {
        Rejection {
            reason: Some(Arc::new(reason)),
            error: None,
        }
    }

    pub fn from_error(error: Fault) -> Self {
        Rejection {
            reason: None,
            error: Some(error),
        }
    }

    /// A fault trapped while running a continuation; it lands in both
    /// slots, the reason side behind [`FaultReason`].
    pub fn from_fault(fault: Fault) -> Self {
        Rejection {
            reason: Some(Arc::new(FaultReason(fault.clone()))),
            error: Some(fault),
        }
    }

    pub fn reason(&self) -> Option<&Payload> {
        self.reason.as_ref()
    }

    pub fn error(&self) -> Option<&Fault> {
        self.error.as_ref()
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejection")
            .field("reason", &self.reason.as_ref().map(|_| ".."))
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

/// Reason payload standing in for a fault trapped at a dispatch boundary.
pub struct FaultReason(pub Fault);

impl fmt::Debug for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaultReason({})", self.0)
    }
}

/// Settlement state plus payloads.
pub(crate) enum Settlement {
    Pending,
    Fulfilled(Payload),
    Rejected(Rejection),
    ForeverPending,
}

impl Settlement {
    pub(crate) fn tag(&self) -> State {
        match self {
            Settlement::Pending => State::Pending,
            Settlement::Fulfilled(_) => State::Fulfilled,
            Settlement::Rejected(_) => State::Rejected,
            Settlement::ForeverPending => State::ForeverPending,
        }
    }
}

/// One queued continuation. Exactly one side fires, chosen by the
/// settlement kind; sides without a user callback forward the settlement
/// to the downstream cell unchanged.
pub(crate) struct Reaction {
    pub(crate) on_fulfilled: Box<dyn FnOnce(Payload) + Send>,
    pub(crate) on_rejected: Box<dyn FnOnce(Rejection) + Send>,
    pub(crate) on_forever_pending: Box<dyn FnOnce() + Send>,
}

pub(crate) struct Inner {
    pub(crate) state: Settlement,
    pub(crate) queue: Vec<Reaction>,
    pub(crate) wakers: Vec<Waker>,
}

/// Shared mutable state of one promise.
pub(crate) struct Cell {
    pub(crate) inner: Mutex<Inner>,
    pub(crate) settled: Condvar,
}

impl Cell {
    pub(crate) fn pending() -> Arc<Self> {
        Cell::with_state(Settlement::Pending)
    }

    pub(crate) fn with_state(state: Settlement) -> Arc<Self> {
        Arc::new(Cell {
            inner: Mutex::new(Inner {
                state,
                queue: Vec::new(),
                wakers: Vec::new(),
            }),
            settled: Condvar::new(),
        })
    }

    pub(crate) fn state(&self) -> State {
        self.inner.lock().state.tag()
    }

    pub(crate) fn fulfilled_value(&self) -> Option<Payload> {
        match &self.inner.lock().state {
            Settlement::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub(crate) fn rejection(&self) -> Option<Rejection> {
        match &self.inner.lock().state {
            Settlement::Rejected(rejection) => Some(rejection.clone()),
            _ => None,
        }
    }

    /// Settle fulfilled. Captures the queue under the lock, then releases
    /// waiters and runs the fulfillment side of every queued reaction in
    /// attachment order.
    pub(crate) fn fulfill(&self, value: Payload) -> Result<(), InternalError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, Settlement::Pending) {
            let state = inner.state.tag();
            drop(inner);
            return Err(InternalError::new("fulfill", state));
        }
        inner.state = Settlement::Fulfilled(value.clone());
        let queue = mem::take(&mut inner.queue);
        let wakers = mem::take(&mut inner.wakers);
        drop(inner);

        self.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        for reaction in queue {
            (reaction.on_fulfilled)(value.clone());
        }
        Ok(())
    }

    /// Settle rejected; the mirror image of `fulfill`.
    pub(crate) fn reject(&self, rejection: Rejection) -> Result<(), InternalError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, Settlement::Pending) {
            let state = inner.state.tag();
            drop(inner);
            return Err(InternalError::new("reject", state));
        }
        inner.state = Settlement::Rejected(rejection.clone());
        let queue = mem::take(&mut inner.queue);
        let wakers = mem::take(&mut inner.wakers);
        drop(inner);

        self.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        for reaction in queue {
            (reaction.on_rejected)(rejection.clone());
        }
        Ok(())
    }

    /// Mark as never settling. Queued reactions are told through their
    /// distinct forever-pending side so downstream cells can propagate the
    /// permanent non-settlement; blocked `wait` callers are NOT released.
    pub(crate) fn forever_pending(&self) -> Result<(), InternalError> {
        if self.forever_pending_quietly() {
            Ok(())
        } else {
            // The cell is terminal by now, so this read is stable.
            Err(InternalError::new("mark forever-pending", self.state()))
        }
    }

    /// The no-report variant used when a controller is dropped.
    pub(crate) fn forever_pending_quietly(&self) -> bool {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, Settlement::Pending) {
            return false;
        }
        inner.state = Settlement::ForeverPending;
        let queue = mem::take(&mut inner.queue);
        let wakers = mem::take(&mut inner.wakers);
        drop(inner);

        for waker in wakers {
            waker.wake();
        }
        for reaction in queue {
            (reaction.on_forever_pending)();
        }
        true
    }

    /// Block the calling thread until settled. A forever-pending promise
    /// is a deliberate permanent non-result: this never returns for one.
    pub(crate) fn wait(&self) -> Result<Payload, WaitError> {
        let mut inner = self.inner.lock();
        loop {
            match &inner.state {
                Settlement::Fulfilled(value) => return Ok(value.clone()),
                Settlement::Rejected(rejection) => {
                    return Err(WaitError::Rejected(rejection.clone()))
                }
                Settlement::Pending | Settlement::ForeverPending => {
                    self.settled.wait(&mut inner)
                }
            }
        }
    }

    /// Bounds only this waiter's patience; the cell is never mutated by a
    /// timeout and may still settle afterward.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Result<Payload, WaitError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            match &inner.state {
                Settlement::Fulfilled(value) => return Ok(value.clone()),
                Settlement::Rejected(rejection) => {
                    return Err(WaitError::Rejected(rejection.clone()))
                }
                Settlement::Pending | Settlement::ForeverPending => {
                    if self.settled.wait_until(&mut inner, deadline).timed_out() {
                        return Err(WaitError::Timeout);
                    }
                }
            }
        }
    }

    /// Async observation. Unlike `wait`, a forever-pending cell is
    /// reported back: no waker will ever arrive for it.
    pub(crate) fn poll_settled(&self, cx: &mut Context<'_>) -> Poll<Result<Payload, WaitError>> {
        let mut inner = self.inner.lock();
        match &inner.state {
            Settlement::Pending => {
                inner.wakers.push(cx.waker().clone());
                Poll::Pending
            }
            Settlement::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            Settlement::Rejected(rejection) => {
                Poll::Ready(Err(WaitError::Rejected(rejection.clone())))
            }
            Settlement::ForeverPending => Poll::Ready(Err(WaitError::NeverSettles)),
        }
    }
}
