//! Binding stores to tracked projections.
//!
//! [`bind_with`] is the projection binding: it subscribes to a store and keeps a
//! [`Tracked`](crate::Tracked) slice of its state current until the enclosing
//! scope is disposed. [`BoundStore`] packages a store together with that binding.

mod binding;
mod bound;

pub use binding::{bind, bind_select, bind_select_with, bind_with, BindOptions, Equality, Selector};
pub use bound::{create, create_deferred, BoundStore, BoundStoreFactory};
