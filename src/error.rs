//! Error types for scheduling operations
//!
//! Errors are classified by who has to act:
//! - Caller input: invalid arguments and business-rule violations
//! - Identity: missing or insufficient privilege
//! - Retryable: unique-constraint races the caller can resubmit as an upsert
//! - Internal: datastore faults, never leaked raw to the caller

use thiserror::Error;

use crate::db::DbError;
use crate::time_math::Weekday;

/// Error types for scheduling operations
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The room creator has not set a meeting interval and day yet")]
    PreferenceNotSet,

    #[error("Availability must be on {expected}, got {submitted}")]
    DayMismatch { expected: Weekday, submitted: Weekday },

    #[error("Availability must last {expected_minutes} minutes, got {submitted_minutes}")]
    DurationMismatch {
        expected_minutes: u16,
        submitted_minutes: u16,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ScheduleError {
    pub fn forbidden(action: &str) -> Self {
        ScheduleError::Forbidden(format!("only the room creator can {}", action))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ScheduleError::InvalidArgument(message.into())
    }

    /// Returns true if resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::Conflict(_))
    }

    /// Returns true if the caller has to change their input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ScheduleError::InvalidArgument(_)
                | ScheduleError::PreferenceNotSet
                | ScheduleError::DayMismatch { .. }
                | ScheduleError::DurationMismatch { .. }
        )
    }

    /// Get a user-facing recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ScheduleError::Unauthenticated => "Log in again and retry.",
            ScheduleError::Forbidden(_) => "Ask the room creator to make this change.",
            ScheduleError::NotFound(_) => "Check the room or meeting still exists.",
            ScheduleError::InvalidArgument(_) => "Correct the highlighted field and resubmit.",
            ScheduleError::PreferenceNotSet => {
                "Wait for the room creator to choose the meeting interval and day."
            }
            ScheduleError::DayMismatch { .. } => "Pick a time on the room's meeting day.",
            ScheduleError::DurationMismatch { .. } => {
                "Resubmit your availability; its length must match the room's meeting interval."
            }
            ScheduleError::Conflict(_) => "Submit again; your previous entry will be replaced.",
            ScheduleError::Configuration(_) => "Check ~/.schedulemate/config.json.",
            ScheduleError::Storage(_) => "Try again shortly.",
        }
    }
}

impl From<DbError> for ScheduleError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            ScheduleError::Conflict(err.to_string())
        } else {
            log::error!("Datastore failure: {}", err);
            ScheduleError::Storage("the datastore request failed".to_string())
        }
    }
}

/// Serializable error representation for the command surface
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidArgument,
    PreferenceNotSet,
    DayMismatch,
    DurationMismatch,
    Conflict,
    Internal,
}

impl From<&ScheduleError> for ErrorPayload {
    fn from(err: &ScheduleError) -> Self {
        let error_type = match err {
            ScheduleError::Unauthenticated => ErrorType::Unauthenticated,
            ScheduleError::Forbidden(_) => ErrorType::Forbidden,
            ScheduleError::NotFound(_) => ErrorType::NotFound,
            ScheduleError::InvalidArgument(_) => ErrorType::InvalidArgument,
            ScheduleError::PreferenceNotSet => ErrorType::PreferenceNotSet,
            ScheduleError::DayMismatch { .. } => ErrorType::DayMismatch,
            ScheduleError::DurationMismatch { .. } => ErrorType::DurationMismatch,
            ScheduleError::Conflict(_) => ErrorType::Conflict,
            ScheduleError::Configuration(_) | ScheduleError::Storage(_) => ErrorType::Internal,
        };

        ErrorPayload {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

impl From<ScheduleError> for ErrorPayload {
    fn from(err: ScheduleError) -> Self {
        ErrorPayload::from(&err)
    }
}
