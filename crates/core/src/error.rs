//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Four-way taxonomy shared by every operation in the warehouse core. The
/// message is the caller-facing description; translating a variant to a
/// transport status code is the caller's job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity is missing or soft-deleted.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness, capacity, or double-claim violation.
    #[error("{0}")]
    Conflict(String),

    /// Illegal transition, missing/invalid reason, malformed input.
    #[error("{0}")]
    BadRequest(String),

    /// Authorization/ownership violation.
    #[error("{0}")]
    Forbidden(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// The caller-facing message, without the taxonomy wrapper.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::Conflict(m) | Self::BadRequest(m) | Self::Forbidden(m) => m,
        }
    }
}
