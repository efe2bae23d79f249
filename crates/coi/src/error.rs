//! Engine error types.
//!
//! Every failure the orchestration engine can surface is one of these
//! variants. Informational no-op outcomes (no containers, nothing to delete)
//! are not errors; they are reported to stderr and exit 0.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the orchestration engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed flags or arguments. No side effects were attempted.
    #[error("{0}")]
    Validation(String),

    /// A container, snapshot, or session is absent.
    #[error("{0}")]
    NotFound(String),

    /// Creating something that already exists (duplicate snapshot name).
    #[error("{0}")]
    AlreadyExists(String),

    /// Auto-resolution matched more than one container.
    #[error("{0}")]
    AmbiguousResolution(String),

    /// A state precondition was violated (restore on a running container,
    /// restore past a later snapshot).
    #[error("{0}")]
    InvalidState(String),

    /// The container runtime cannot be reached or denied permission.
    /// Fatal; the engine does not retry.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A runtime command failed for a reason other than the above.
    #[error("{command} failed: {message}")]
    Runtime { command: String, message: String },

    /// Underlying IO failure (session store, event files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// Validation errors exit 2 so scripts can tell "you called it wrong"
    /// from "the operation failed".
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) => 2,
            _ => 1,
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Shorthand for an invalid-state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_exit_2() {
        assert_eq!(Error::validation("bad flag").exit_code(), 2);
    }

    #[test]
    fn other_errors_exit_1() {
        assert_eq!(Error::not_found("container 'x' not found").exit_code(), 1);
        assert_eq!(
            Error::invalid_state("container must be stopped").exit_code(),
            1
        );
        assert_eq!(
            Error::RuntimeUnavailable("daemon unreachable".into()).exit_code(),
            1
        );
    }
}
