//! ==============================================================================
//! error.rs - failure taxonomy
//! ==============================================================================
//!
//! purpose:
//!     one enum per failure family. the queue engine absorbs every i/o error
//!     at its boundary and only reflects it through SyncState and logs, so
//!     none of these ever reach a user except as a status string.
//!
//! relationships:
//!     - used by: hal.rs, persist.rs, remote.rs (collaborator failures)
//!     - used by: aggregate.rs (caller mistakes)
//!     - used by: storage.rs, server.rs (hub data file + http boundary)
//!
//! ==============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// sample source could not report a count for the requested window
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("sample source unavailable: {0}")]
    Unavailable(String),
}

/// durable queue slot could not be read or written
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("queue store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode pending queue: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode pending queue: {0}")]
    Decode(serde_json::Error),
}

/// remote sink refused or never answered a submission
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("sink rejected measurement ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl SubmitError {
    /// short label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Rejected { .. } => "rejected",
            SubmitError::Transport(_) => "transport",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// hub data file failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("data file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode step readings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// one field-level validation problem
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// errors surfaced at the hub http boundary
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error")]
    Validation(Vec<Issue>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(issues) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "message": "Validation error",
                    "issues": issues,
                })),
            )
                .into_response(),
            ApiError::Aggregate(e) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": e.to_string() })),
            )
                .into_response(),
            ApiError::Store(e) => {
                tracing::error!("[HUB] store failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "message": "Unexpected error" })),
                )
                    .into_response()
            }
        }
    }
}
