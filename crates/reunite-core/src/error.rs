use thiserror::Error;

/// Failure taxonomy surfaced to callers. Every engine validates and fails
/// fast before writing; once a write commits, downstream fan-out failures
/// are logged instead of unwinding it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input: missing text and attachment, malformed reply reference.
    #[error("{0}")]
    Validation(String),

    /// The caller is not allowed to perform this operation on this entity.
    #[error("{0}")]
    Permission(String),

    /// The entity exists but its state does not permit the operation.
    /// Distinct from NotFound so callers do not retry blindly.
    #[error("{0}")]
    StateConflict(String),

    /// The entity does not exist or is not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Store failure or corrupt row. Callers surface a generic error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
