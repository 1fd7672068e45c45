//! Error type definitions for the birthday scheduler
//!
//! This module defines the application-level error types. Errors owned by
//! the scheduling engine live next to it in `job_scheduling::types` and are
//! chained in here.

use thiserror::Error;

use crate::job_scheduling::SchedulingError;
use crate::utils::validation::ValidationError;

/// Top-level application error type
///
/// This enum represents every error the person service and the binary can
/// surface. It uses `thiserror` for the trait implementations and chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Scheduling engine errors
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Validation errors, one entry per offending field
    #[error("Validation failed: {}", format_validation_errors(.errors))]
    Validation { errors: Vec<ValidationError> },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database connection failures
    #[error("Database connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Constraint violations (unique, foreign key, etc.)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// Backing store temporarily unavailable
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

impl AppError {
    /// Create a validation error from collected field errors
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self::Validation { errors }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl RepositoryError {
    /// Create a record not found error
    pub fn record_not_found<T: Into<String>, F: Into<String>, V: ToString>(
        table: T,
        field: F,
        value: V,
    ) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Create a store unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Whether retrying the same call later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Unavailable { .. } | Self::Database(_)
        )
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<Vec<ValidationError>> for AppError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message_lists_fields() {
        let error = AppError::validation(vec![
            ValidationError::Required {
                field: "name".to_string(),
            },
            ValidationError::InvalidTimezone {
                field: "timezone".to_string(),
                value: "Mars/Olympus".to_string(),
            },
        ]);

        let message = error.to_string();
        assert!(message.contains("'name' is required"));
        assert!(message.contains("Mars/Olympus"));
    }

    #[test]
    fn test_repository_error_transience() {
        assert!(RepositoryError::unavailable("down").is_transient());
        assert!(!RepositoryError::record_not_found("persons", "id", 1).is_transient());
    }
}
