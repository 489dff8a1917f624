//! # Tincan Bind
//!
//! Bind external state stores to fine-grained reactive projections.
//!
//! A store holds application state and announces changes; a reactive runtime
//! re-runs effects when values they read change. This crate connects the two:
//!
//! ## Store
//!
//! - `StoreApi` - The shape a bindable store must have
//! - `Store<T>` - Thread-safe store of immutable state snapshots
//!
//! ## Reactivity
//!
//! - `Tracked<T>` - Projection tracked position by position, updated by reconciliation
//! - `Effect` - Computation that re-runs when positions it read change
//! - `Scope` - Owner of cleanups, disposed once
//!
//! ## Binding
//!
//! - `bind`, `bind_select`, `bind_select_with` - Project a store slice into a `Tracked`
//! - `BoundStore` - A store that is also a source of tracked projections
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tincan_bind::runtime::create_root;
//! use tincan_bind::{create, create_effect};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Bears {
//!     count: u32,
//!     names: Vec<String>,
//! }
//!
//! let bears = create(|_| Bears { count: 0, names: vec![] });
//!
//! let scope = create_root(|scope| {
//!     let count = bears.select(|state: &Bears| state.count).unwrap();
//!     create_effect(move || println!("bears: {}", count.get().unwrap()));
//!     scope
//! });
//!
//! bears.update(|state| state.count += 1);
//! scope.dispose();
//! ```

pub mod bind;
pub mod effect;
pub mod error;
pub mod runtime;
pub mod store;
mod sync;
pub mod tracked;

// Re-export main types for convenience
pub use bind::{
    bind, bind_select, bind_select_with, bind_with, create, create_deferred, BindOptions,
    BoundStore, BoundStoreFactory,
};
pub use effect::{create_effect, Effect};
pub use error::{Error, Result};
pub use store::{Store, StoreApi, StoreSetter, Subscription};
pub use tracked::{ReconcileOptions, Tracked, TrackedNode};
