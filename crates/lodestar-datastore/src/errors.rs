//! Resource engine error model.

use lodestar_state::StoreError;
use lodestar_types::AggregateError;

/// Errors surfaced by the resource sync engine and datastore drivers.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// A resource spec violated a driver's constraints.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The named record does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// A conversion between resource representations failed.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The backing datastore rejected a materialization.
    #[error("datastore error: {0}")]
    Backend(String),

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request context was cancelled mid-batch.
    #[error("operation cancelled")]
    Cancelled,

    /// Multiple per-item failures from one batch.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl ResourceError {
    /// Missing-record constructor.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Validation constructor.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Adapter constructor.
    #[must_use]
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter(message.into())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ResourceError>;
