//! One factory for all three views.
//!
//! A view is a calling convention around an `Arc<Cell>`, nothing more;
//! minting and converting views never touches settlement state.

use crate::cell::{Cell, Rejection, Settlement};
use crate::Payload;
use std::sync::Arc;

pub(crate) trait ViewFactory: Sized {
    fn from_cell(cell: Arc<Cell>) -> Self;
    fn cell(&self) -> &Arc<Cell>;
}

pub(crate) fn fulfilled_view<V: ViewFactory>(value: Payload) -> V {
    V::from_cell(Cell::with_state(Settlement::Fulfilled(value)))
}

pub(crate) fn rejected_view<V: ViewFactory>(rejection: Rejection) -> V {
    V::from_cell(Cell::with_state(Settlement::Rejected(rejection)))
}

pub(crate) fn forever_pending_view<V: ViewFactory>() -> V {
    V::from_cell(Cell::with_state(Settlement::ForeverPending))
}

pub(crate) fn pending_view<V: ViewFactory>() -> (V, Arc<Cell>) {
    let cell = Cell::pending();
    (V::from_cell(cell.clone()), cell)
}

/// View conversion: relabel the same cell, never a new chain.
pub(crate) fn convert<A: ViewFactory, B: ViewFactory>(view: &A) -> B {
    B::from_cell(view.cell().clone())
}
