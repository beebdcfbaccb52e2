//! The chaining core: reactions, dispatchers, delegation.
//!
//! Every view's `then`-shaped operation lowers onto [`subscribe`], which
//! decides under the source lock whether to queue a continuation, hand
//! back a pre-built settled cell, or run the callback right away.

use crate::cell::{Cell, Reaction, Rejection, Settlement};
use crate::diagnostics::{self, InternalError};
use crate::outcome::{resolve_outcome, Outcome, OutcomeKind, Resolution};
use crate::{Fault, Payload};
use std::sync::Arc;

/// A unit of continuation work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where continuations run. Supplied by the caller; with none supplied,
/// the triggering thread runs them inline: the thread calling `then` for
/// an already-settled source, or the settling thread for a pending one.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

pub type DispatcherRef = Arc<dyn Dispatcher>;

/// Runs each job immediately on the calling thread.
pub struct Inline;

impl Dispatcher for Inline {
    fn dispatch(&self, job: Job) {
        job()
    }
}

/// Fulfillment-side continuation: receives the payload, produces the next
/// outcome or a fault.
pub type FulfillHandler = Box<dyn FnOnce(Payload) -> Result<Outcome, Fault> + Send + 'static>;

/// Rejection-side continuation.
pub type RejectHandler = Box<dyn FnOnce(Rejection) -> Result<Outcome, Fault> + Send + 'static>;

/// Report an internal error trapped at a dispatch boundary, then abandon
/// the operation. Never turns into a rejection.
pub(crate) fn trap(result: Result<(), InternalError>) {
    if let Err(error) = result {
        diagnostics::report(&error);
    }
}

fn complete(result: Result<Outcome, Fault>, target: &Arc<Cell>) {
    match result {
        Ok(outcome) => resolve_outcome(outcome, target.clone()),
        Err(fault) => trap(target.reject(Rejection::from_fault(fault))),
    }
}

/// Build the downstream cell for a continuation that already ran. Plain
/// results build it settled; only promise and thenable outcomes need a
/// pending cell to delegate into.
fn settle_inline(result: Result<Outcome, Fault>) -> Arc<Cell> {
    match result {
        Err(fault) => Cell::with_state(Settlement::Rejected(Rejection::from_fault(fault))),
        Ok(outcome) => match outcome.0 {
            OutcomeKind::Value(value) => Cell::with_state(Settlement::Fulfilled(value)),
            OutcomeKind::Resolution(Resolution::Fulfilled(value)) => {
                Cell::with_state(Settlement::Fulfilled(value))
            }
            OutcomeKind::Resolution(Resolution::Rejected(rejection)) => {
                Cell::with_state(Settlement::Rejected(rejection))
            }
            kind => {
                let target = Cell::pending();
                resolve_outcome(Outcome(kind), target.clone());
                target
            }
        },
    }
}

/// Chain-by-delegation: forward `source`'s settlement into `target`.
/// Delegated values are always plain (every settlement flows through the
/// resolver first), so the forwarding sides settle `target` directly.
pub(crate) fn attach_delegate(source: &Arc<Cell>, target: Arc<Cell>) {
    let mut inner = source.inner.lock();
    match &inner.state {
        Settlement::Pending => {
            inner.queue.push(passthrough(target));
        }
        Settlement::Fulfilled(value) => {
            let value = value.clone();
            drop(inner);
            trap(target.fulfill(value));
        }
        Settlement::Rejected(rejection) => {
            let rejection = rejection.clone();
            drop(inner);
            trap(target.reject(rejection));
        }
        Settlement::ForeverPending => {
            drop(inner);
            trap(target.forever_pending());
        }
    }
}

fn passthrough(target: Arc<Cell>) -> Reaction {
    let fulfill_target = target.clone();
    let reject_target = target.clone();
    Reaction {
        on_fulfilled: Box::new(move |value| trap(fulfill_target.fulfill(value))),
        on_rejected: Box::new(move |rejection| trap(reject_target.reject(rejection))),
        on_forever_pending: Box::new(move || trap(target.forever_pending())),
    }
}

fn reaction(
    downstream: Arc<Cell>,
    dispatcher: Option<DispatcherRef>,
    on_fulfilled: Option<FulfillHandler>,
    on_rejected: Option<RejectHandler>,
) -> Reaction {
    let fulfill: Box<dyn FnOnce(Payload) + Send> = match on_fulfilled {
        None => {
            let target = downstream.clone();
            Box::new(move |value| trap(target.fulfill(value)))
        }
        Some(handler) => {
            let target = downstream.clone();
            match dispatcher.clone() {
                None => Box::new(move |value| complete(handler(value), &target)),
                Some(dispatcher) => Box::new(move |value| {
                    dispatcher.dispatch(Box::new(move || complete(handler(value), &target)))
                }),
            }
        }
    };
    let reject: Box<dyn FnOnce(Rejection) + Send> = match on_rejected {
        None => {
            let target = downstream.clone();
            Box::new(move |rejection| trap(target.reject(rejection)))
        }
        Some(handler) => {
            let target = downstream.clone();
            match dispatcher {
                None => Box::new(move |rejection| complete(handler(rejection), &target)),
                Some(dispatcher) => Box::new(move |rejection| {
                    dispatcher.dispatch(Box::new(move || complete(handler(rejection), &target)))
                }),
            }
        }
    };
    Reaction {
        on_fulfilled: fulfill,
        on_rejected: reject,
        on_forever_pending: Box::new(move || trap(downstream.forever_pending())),
    }
}

/// The `then` core shared by every view.
pub(crate) fn subscribe(
    source: &Arc<Cell>,
    dispatcher: Option<DispatcherRef>,
    on_fulfilled: Option<FulfillHandler>,
    on_rejected: Option<RejectHandler>,
) -> Arc<Cell> {
    let mut inner = source.inner.lock();
    match &inner.state {
        Settlement::Pending => {
            let downstream = Cell::pending();
            inner.queue.push(reaction(
                downstream.clone(),
                dispatcher,
                on_fulfilled,
                on_rejected,
            ));
            downstream
        }
        // Propagation, not delegation: nothing will ever fire, so no
        // queue entry is created.
        Settlement::ForeverPending => {
            drop(inner);
            Cell::with_state(Settlement::ForeverPending)
        }
        Settlement::Fulfilled(value) => {
            let value = value.clone();
            drop(inner);
            match on_fulfilled {
                None => Cell::with_state(Settlement::Fulfilled(value)),
                Some(handler) => match dispatcher {
                    None => settle_inline(handler(value)),
                    Some(dispatcher) => {
                        let downstream = Cell::pending();
                        let target = downstream.clone();
                        dispatcher.dispatch(Box::new(move || complete(handler(value), &target)));
                        downstream
                    }
                },
            }
        }
        Settlement::Rejected(rejection) => {
            let rejection = rejection.clone();
            drop(inner);
            match on_rejected {
                None => Cell::with_state(Settlement::Rejected(rejection)),
                Some(handler) => match dispatcher {
                    None => settle_inline(handler(rejection)),
                    Some(dispatcher) => {
                        let downstream = Cell::pending();
                        let target = downstream.clone();
                        dispatcher
                            .dispatch(Box::new(move || complete(handler(rejection), &target)));
                        downstream
                    }
                },
            }
        }
    }
}
