//! Error types for dht-shell.

use thiserror::Error;

use crate::backend::BackendError;
use crate::security::AclError;

/// Main error type for dht-shell operations.
#[derive(Error, Debug)]
pub enum DhtShellError {
    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// Two commands were registered under the same name or alias.
    #[error("duplicate command name: {0}")]
    DuplicateCommand(String),

    /// Access list could not be loaded.
    #[error(transparent)]
    Acl(#[from] AclError),

    /// Backend failure outside of a command handler.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server has been halted and no longer schedules work.
    #[error("server halted")]
    Halted,

    /// Remote sessions are not admitted while suspended.
    #[error("server is not accepting new connections")]
    NotAccepting,

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for dht-shell operations.
pub type Result<T> = std::result::Result<T, DhtShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_not_found_display() {
        let err = DhtShellError::SessionNotFound("sess-00000001".into());
        assert!(err.to_string().contains("sess-00000001"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_duplicate_command_display() {
        let err = DhtShellError::DuplicateCommand("get".into());
        assert_eq!(err.to_string(), "duplicate command name: get");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let shell_err: DhtShellError = io_err.into();
        assert!(matches!(shell_err, DhtShellError::Io(_)));
        assert!(shell_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_backend_error_conversion() {
        let err: DhtShellError = BackendError::Stopped.into();
        assert!(matches!(err, DhtShellError::Backend(_)));
        assert!(err.to_string().contains("backend error"));
    }

    #[test]
    fn test_halted_display() {
        assert_eq!(DhtShellError::Halted.to_string(), "server halted");
    }
}
