// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for runplane-core.
//!
//! A single error type is shared by the state machine, the runtime and
//! framework dispatch layers, and the runnable stores so that errors can
//! propagate from a transition's internal logic to the original caller
//! unchanged.

use std::time::Duration;

use thiserror::Error;

use crate::fsm::FsmError;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the orchestration engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// State machine rejected or failed a transition.
    #[error(transparent)]
    Fsm(#[from] FsmError),

    /// A run, runnable, definition or substrate object does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// What was looked up (run, runnable, task, ...).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The run's declared kind does not match the runtime asked to handle it.
    #[error("kind mismatch: expected '{expected}', got '{actual}'")]
    KindMismatch {
        /// The kind the handler accepts.
        expected: String,
        /// The kind that was supplied.
        actual: String,
    },

    /// The task kind is not in the runtime's closed set of task kinds.
    #[error("runtime '{runtime}' does not support task kind '{task_kind}'")]
    UnsupportedTaskKind {
        /// Runtime that rejected the task.
        runtime: String,
        /// Task kind that was requested.
        task_kind: String,
    },

    /// No runtime is registered for the run kind.
    #[error("no runtime registered for kind '{0}'")]
    UnknownRuntime(String),

    /// No framework is registered for the runnable kind.
    #[error("no framework registered for runnable kind '{0}'")]
    UnknownFramework(String),

    /// The task reference could not be parsed.
    #[error("invalid task reference '{reference}': {reason}")]
    InvalidTaskRef {
        /// The raw reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation is legitimately not supported by this handler.
    #[error("operation '{operation}' is not supported by '{handler}'")]
    Unsupported {
        /// Operation that was requested.
        operation: &'static str,
        /// Framework or runtime that does not support it.
        handler: String,
    },

    /// The execution substrate rejected or failed the request.
    #[error("framework '{framework}' failed: {message}")]
    Framework {
        /// Framework kind.
        framework: String,
        /// Substrate error message.
        message: String,
    },

    /// A substrate call did not answer in time.
    #[error("'{operation}' timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// The applied timeout.
        timeout: Duration,
    },

    /// A runnable store operation failed.
    #[error("store error during '{operation}': {details}")]
    Store {
        /// Store operation.
        operation: &'static str,
        /// Error details.
        details: String,
    },

    /// A transition was requested without the input its logic needs.
    #[error("invalid input for {event}: {reason}")]
    InvalidInput {
        /// Requested event.
        event: String,
        /// What is missing.
        reason: String,
    },

    /// Registration tables are inconsistent.
    #[error("registration error: {0}")]
    Registration(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for a [`CoreError::Framework`].
    pub fn framework(framework: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Framework {
            framework: framework.into(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Fsm(e) => e.error_code(),
            Self::NotFound { .. } => "NOT_FOUND",
            Self::KindMismatch { .. } => "KIND_MISMATCH",
            Self::UnsupportedTaskKind { .. } => "UNSUPPORTED_TASK_KIND",
            Self::UnknownRuntime(_) => "UNKNOWN_RUNTIME",
            Self::UnknownFramework(_) => "UNKNOWN_FRAMEWORK",
            Self::InvalidTaskRef { .. } => "INVALID_TASK_REF",
            Self::Unsupported { .. } => "UNSUPPORTED",
            Self::Framework { .. } => "FRAMEWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Store { .. } => "STORE_ERROR",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Registration(_) => "REGISTRATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the caller may retry the same request later.
    ///
    /// Only substrate unavailability qualifies. Kind mismatches, illegal
    /// transitions and missing entities never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error is a rejected state transition.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Self::Fsm(e) if e.is_illegal())
    }

    /// Whether this error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CoreError::not_found("runnable", "run-1");
        assert_eq!(err.to_string(), "runnable 'run-1' not found");
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_illegal_transition_code() {
        let err: CoreError = FsmError::IllegalTransition {
            state: "CREATED".to_string(),
            event: "EXECUTE".to_string(),
        }
        .into();
        assert!(err.is_illegal_transition());
        assert_eq!(err.error_code(), "ILLEGAL_TRANSITION");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        let timeout = CoreError::Timeout {
            operation: "status".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(timeout.is_retryable());
        assert!(!CoreError::framework("job", "boom").is_retryable());
        assert!(!CoreError::UnknownRuntime("x".to_string()).is_retryable());
    }
}
