//! Structured engine errors.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Rejected input
    ValidationError,
    InvalidTransition,
    Forbidden,

    // Missing records
    NotFound,

    // Duplicate writes (treated as success by generation)
    Conflict,

    // Collaborators
    ExternalDependencyError,
    TimezoneResolutionError,

    // Internal
    StorageError,
}

/// Errors raised by the rollover core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("transition {from} -> {to} is not allowed")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("{service} failed: {reason}")]
    ExternalDependency { service: String, reason: String },

    #[error("unknown timezone '{0}'")]
    TimezoneResolution(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } => ErrorCode::ValidationError,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Conflict(_) => ErrorCode::Conflict,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::Forbidden(_) => ErrorCode::Forbidden,
            EngineError::ExternalDependency { .. } => ErrorCode::ExternalDependencyError,
            EngineError::TimezoneResolution(_) => ErrorCode::TimezoneResolutionError,
            EngineError::Storage(_) => ErrorCode::StorageError,
        }
    }

    // Convenience constructors

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: &str) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        EngineError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        EngineError::Forbidden(reason.into())
    }

    pub fn external(service: &str, reason: impl ToString) -> Self {
        EngineError::ExternalDependency {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error only rejects the template being generated.
    pub fn is_template_scoped(&self) -> bool {
        matches!(
            self,
            EngineError::Validation { .. } | EngineError::NotFound { .. }
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        let field = match self {
            EngineError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            field,
        }
    }
}

/// Serializable error shape returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
