//! Error types for livetools-tasks
//!
//! This module provides the error hierarchy for the task engine:
//! - Task control errors (unknown ids, illegal state transitions)
//! - Platform errors raised by the wrapped upload/edit/download client
//! - Comment queue errors (unknown items, staleness)
//! - Machine-readable codes for the UI boundary

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Status, TaskId};

/// Result type alias for livetools-tasks operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for livetools-tasks
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_tasks")
        key: Option<String>,
    },

    /// Task control error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Comment queue error
    #[error("comment queue error: {0}")]
    Comment(#[from] CommentError),

    /// The wrapped platform call rejected
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Upload options failed validation
    #[error("invalid upload options: {0}")]
    Validation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task control errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Task id is not in the registry
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: TaskId,
    },

    /// Control operation not allowed from the current state
    #[error("cannot {operation} task {id} in state {current}")]
    InvalidTransition {
        /// The task ID the operation targeted
        id: TaskId,
        /// The operation that was attempted (e.g., "pause", "resume")
        operation: String,
        /// The state that prevents the operation
        current: Status,
    },

    /// Task already reached completed, error or interrupted
    #[error("cannot {operation} task {id}: already terminal ({current})")]
    AlreadyTerminal {
        /// The task ID the operation targeted
        id: TaskId,
        /// The operation that was attempted
        operation: String,
        /// The terminal state
        current: Status,
    },

    /// Task is still executing and must be killed first
    #[error("task {id} is still {current}; kill it before removing")]
    StillRunning {
        /// The task ID that is still in flight
        id: TaskId,
        /// The in-flight state (running or paused)
        current: Status,
    },

    /// Parent/child links that cannot be registered
    #[error("task {id} cannot be registered: {reason}")]
    InvalidGraph {
        /// The task being registered
        id: TaskId,
        /// What is wrong with its links
        reason: String,
    },

    /// Child task did not complete, so the parent cannot
    #[error("child task {child} ended in state {child_status}")]
    DependencyFailure {
        /// The child that failed
        child: TaskId,
        /// The child's terminal state
        child_status: Status,
    },
}

/// Errors raised by the wrapped platform client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Request was rejected or failed on the network
    #[error("request failed: {0}")]
    Request(String),

    /// Operation observed its cancellation token and stopped
    #[error("operation cancelled")]
    Cancelled,

    /// No account is configured for the call
    #[error("no account logged in")]
    NotLoggedIn,

    /// Operation kind is not offered by this client
    #[error("not supported: {0}")]
    Unsupported(String),
}

/// Comment queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommentError {
    /// No item for this submission
    #[error("no comment queued for submission {aid}")]
    NotFound {
        /// Submission id
        aid: u64,
    },

    /// Item stayed pending longer than the staleness window
    #[error("submission {aid} was not approved within {window_secs}s")]
    PreconditionTimeout {
        /// Submission id
        aid: u64,
        /// Staleness window in seconds
        window_secs: u64,
    },
}

impl Error {
    /// Machine-readable error code for the UI boundary
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Task(TaskError::NotFound { .. }) => "not_found",
            Error::Task(TaskError::InvalidTransition { .. }) => "invalid_transition",
            Error::Task(TaskError::AlreadyTerminal { .. }) => "already_terminal",
            Error::Task(TaskError::StillRunning { .. }) => "still_running",
            Error::Task(TaskError::InvalidGraph { .. }) => "invalid_graph",
            Error::Task(TaskError::DependencyFailure { .. }) => "dependency_failure",
            Error::Comment(CommentError::NotFound { .. }) => "not_found",
            Error::Comment(CommentError::PreconditionTimeout { .. }) => "precondition_timeout",
            Error::Platform(_) => "operation_failure",
            Error::Validation(_) => "validation_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }

    /// Shorthand for a task lookup miss
    pub(crate) fn task_not_found(id: TaskId) -> Self {
        Error::Task(TaskError::NotFound { id })
    }
}

/// Error report handed across the UI boundary
///
/// # Example JSON
///
/// ```json
/// {
///   "code": "already_terminal",
///   "message": "task error: cannot pause task 4: already terminal (completed)",
///   "details": { "task_id": 4 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_transition")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::Task(TaskError::NotFound { id })
            | Error::Task(TaskError::InvalidTransition { id, .. })
            | Error::Task(TaskError::AlreadyTerminal { id, .. })
            | Error::Task(TaskError::StillRunning { id, .. })
            | Error::Task(TaskError::InvalidGraph { id, .. }) => {
                Some(serde_json::json!({ "task_id": id }))
            }
            Error::Task(TaskError::DependencyFailure { child, .. }) => {
                Some(serde_json::json!({ "child_id": child }))
            }
            Error::Comment(CommentError::NotFound { aid })
            | Error::Comment(CommentError::PreconditionTimeout { aid, .. }) => {
                Some(serde_json::json!({ "aid": aid }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}
