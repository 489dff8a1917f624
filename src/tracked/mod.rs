//! Tracked projections.
//!
//! A [`Tracked`] value is the reactive side of a binding: readers depend on the
//! positions they touch, and [`Tracked::reconcile`] patches new data in while
//! keeping unchanged positions (and their dependents) untouched.

mod encode;
mod node;
mod reconcile;
mod tracked;

pub(crate) use encode::to_tracked_value;
pub use reconcile::ReconcileOptions;
pub use tracked::{Tracked, TrackedNode};
