//! Structured status mapping for boundary operations.

use lodestar_datastore::ResourceError;
use lodestar_engine::SyncError;
use serde::Serialize;

/// Status code vocabulary of the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    NotFound,
    FailedPrecondition,
    Internal,
}

/// Error surfaced to the transport layer.
///
/// `message` keeps the original error text first so operators can see the
/// root cause before the handler context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Internal,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::FailedPrecondition,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::NotFound,
            message: message.into(),
        }
    }
}

/// Map an engine error, prepending its message to `context` for anything
/// that lands on `Internal`.
pub fn from_sync_error(err: &SyncError, context: &str) -> RpcStatus {
    match err {
        SyncError::Validation(_) => RpcStatus::failed_precondition(err.to_string()),
        SyncError::NotFound { .. } => RpcStatus::not_found(err.to_string()),
        SyncError::Store(store) if store.is_not_found() => RpcStatus::not_found(err.to_string()),
        _ => RpcStatus::internal(format!("{err}: {context}")),
    }
}

/// Map a resource-engine error, prepending its message to `context` for
/// anything that lands on `Internal`.
pub fn from_resource_error(err: &ResourceError, context: &str) -> RpcStatus {
    match err {
        ResourceError::Validation(_) => RpcStatus::failed_precondition(err.to_string()),
        ResourceError::NotFound { .. } => RpcStatus::not_found(err.to_string()),
        ResourceError::Store(store) if store.is_not_found() => {
            RpcStatus::not_found(err.to_string())
        }
        _ => RpcStatus::internal(format!("{err}: {context}")),
    }
}

/// Map a bare store error.
pub fn from_store_error(err: &lodestar_state::StoreError, context: &str) -> RpcStatus {
    if err.is_not_found() {
        RpcStatus::not_found(err.to_string())
    } else {
        RpcStatus::internal(format!("{err}: {context}"))
    }
}
