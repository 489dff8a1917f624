//! Error types shared across the crate.

use thiserror::Error;

/// Errors raised while building, reading or updating a tracked projection.
#[derive(Debug, Error)]
pub enum Error {
    /// A slice could not be converted into the tracked data model.
    #[error("failed to serialize slice: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A slice held NaN or an infinity, which the tracked data model cannot represent.
    #[error("slice contains a non-finite float ({0})")]
    NonFinite(f64),

    /// A tracked value could not be converted back into the requested type.
    #[error("failed to deserialize tracked value: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// A store handle outlived its store, or was used before construction finished.
    #[error("store is not available (still initializing or already dropped)")]
    StoreDetached,

    /// A path passed to a tracked read was not a valid JSON pointer.
    #[error("invalid path `{0}`: paths must be empty or start with `/`")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, Error>;
