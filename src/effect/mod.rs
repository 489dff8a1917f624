//! Rendering computations that react to tracked projections.

mod effect;

pub use effect::{create_effect, Effect};
