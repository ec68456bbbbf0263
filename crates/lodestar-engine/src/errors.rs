//! Engine error model.

use lodestar_state::StoreError;
use lodestar_types::AggregateError;

fn cancelled_message(partial: &AggregateError) -> String {
    if partial.is_empty() {
        "operation cancelled".to_string()
    } else {
        format!("operation cancelled; {partial}")
    }
}

/// Errors surfaced by the job sync engine.
///
/// Per-item failures inside a batch are captured into [`Aggregate`] and the
/// batch completes; structural failures ([`Cycle`], unknown project) abort
/// immediately.
///
/// [`Aggregate`]: SyncError::Aggregate
/// [`Cycle`]: SyncError::Cycle
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A spec violated a structural constraint before being accepted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The named record does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// The request contradicts existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A job referenced an upstream that is not registered anywhere.
    #[error("could not find registered job {dependency}, used in {job}")]
    UnknownDependency { job: String, dependency: String },

    /// The dependency graph contains a cycle.
    #[error("cycle detected involving jobs: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The compiler rejected a spec.
    #[error("failed to compile {name}: {message}")]
    Compile { name: String, message: String },

    /// The request context was cancelled; carries failures observed before
    /// the cancellation took effect.
    #[error("{}", cancelled_message(.0))]
    Cancelled(AggregateError),

    /// Engine-internal failure (panicked worker, poisoned state).
    #[error("internal error: {0}")]
    Internal(String),

    /// Multiple per-item failures from one batch.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl SyncError {
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
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SyncError>;
