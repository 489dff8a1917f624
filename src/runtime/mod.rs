//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking, the reactive
//! graph, and the scopes that own cleanups.

mod context;
mod scope;

pub use context::ReactiveRuntime;
pub use scope::{create_root, current_scope, on_cleanup, Cleanup, Scope};
