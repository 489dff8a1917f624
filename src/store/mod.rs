//! External state stores.
//!
//! A store owns application state and exposes a pull read (`get_state`) and a
//! push notification (`subscribe`). [`StoreApi`] is the shape a binding needs;
//! [`Store`] is the bundled implementation.

mod api;
mod store;

pub use api::{Listener, StoreApi, Subscription};
pub use store::{Store, StoreSetter};
