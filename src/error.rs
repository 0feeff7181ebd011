//! Quota Engine Error Types
//!
//! Infrastructure and caller errors. Business outcomes such as an exhausted
//! window or a replayed consumption are ordinary result variants and never
//! travel through this type, except where a surface explicitly asks for it
//! via [`ConsumptionOutcome::into_result`](crate::engine::ConsumptionOutcome::into_result).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quota::Gate;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, QuotaError>;

/// Kind of entity referenced by a lookup error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Quota-holding subject
    Subject,
    /// Consumable resource
    Resource,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Subject => write!(f, "subject"),
            EntityKind::Resource => write!(f, "resource"),
        }
    }
}

/// Caller-visible error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed input
    Invalid,
    /// Subject or resource does not exist
    NotFound,
    /// Subject is not eligible to consume at all
    Forbidden,
    /// Quota window exhausted
    Ineligible,
    /// Transient collision, safe to retry
    Conflict,
    /// Infrastructure failure
    Internal,
}

/// Error types for quota operations
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Malformed identifier or request parameter
    #[error("Invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    /// Subject or resource missing
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Entity registered twice
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    /// Subject not verified by the identity provider
    #[error("Subject {0} is not verified")]
    Forbidden(String),

    /// A quota window is exhausted
    #[error("{gate} quota exceeded, resets at {} (in {retry_after_secs}s)", reset_at.to_rfc3339())]
    QuotaExceeded {
        gate: Gate,
        reason: String,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },

    /// Concurrency collision at commit; the caller may retry
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure, fatal for the request
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl QuotaError {
    /// Shorthand for a validation failure
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        QuotaError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing subject
    pub fn subject_not_found(id: impl std::fmt::Display) -> Self {
        QuotaError::NotFound {
            kind: EntityKind::Subject,
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing resource
    pub fn resource_not_found(id: impl std::fmt::Display) -> Self {
        QuotaError::NotFound {
            kind: EntityKind::Resource,
            id: id.to_string(),
        }
    }

    /// Map to the caller-visible code
    pub fn code(&self) -> ErrorCode {
        match self {
            QuotaError::Validation { .. } | QuotaError::AlreadyExists { .. } => ErrorCode::Invalid,
            QuotaError::NotFound { .. } => ErrorCode::NotFound,
            QuotaError::Forbidden(_) => ErrorCode::Forbidden,
            QuotaError::QuotaExceeded { .. } => ErrorCode::Ineligible,
            QuotaError::Conflict(_) => ErrorCode::Conflict,
            QuotaError::Persistence(_) => ErrorCode::Internal,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuotaError::Conflict(_))
    }
}

impl From<std::io::Error> for QuotaError {
    fn from(err: std::io::Error) -> Self {
        QuotaError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for QuotaError {
    fn from(err: serde_json::Error) -> Self {
        QuotaError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QuotaError::invalid("subject_id", "empty").code(),
            ErrorCode::Invalid
        );
        assert_eq!(
            QuotaError::subject_not_found("u-1").code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            QuotaError::Conflict("busy".to_string()).code(),
            ErrorCode::Conflict
        );
        assert_eq!(
            QuotaError::Persistence("disk full".to_string()).code(),
            ErrorCode::Internal
        );
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(QuotaError::Conflict("busy".to_string()).is_retryable());
        assert!(!QuotaError::Persistence("io".to_string()).is_retryable());
        assert!(!QuotaError::Forbidden("u-1".to_string()).is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = QuotaError::resource_not_found("book-9");
        assert_eq!(err.to_string(), "resource not found: book-9");
    }

    #[test]
    fn test_quota_exceeded_message_carries_iso_timestamp() {
        let reset_at = DateTime::parse_from_rfc3339("2026-10-20T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = QuotaError::QuotaExceeded {
            gate: Gate::Daily,
            reason: "Daily limit reached".to_string(),
            reset_at,
            retry_after_secs: 3600,
        };
        let message = err.to_string();
        assert!(message.contains("daily quota exceeded"));
        assert!(message.contains("2026-10-20T00:00:00+00:00"));
        assert!(message.contains("3600s"));
    }

    #[test]
    fn test_io_error_is_persistence() {
        let err: QuotaError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, QuotaError::Persistence(_)));
    }
}
