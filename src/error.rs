//! Error types for session-vault.

use thiserror::Error;

/// Main error type for session-vault operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Requested backend is unknown or its dependency is missing.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend reported a connectivity, quota or storage error.
    #[error("storage backend failure: {0}")]
    BackendFailure(String),

    /// Backend holds a lock on the session record.
    #[error("session record locked: {0}")]
    Locked(String),

    /// Stored blob could not be decoded.
    #[error("failed to decode session data: {0}")]
    Decode(String),

    /// Session data could not be encoded.
    #[error("failed to encode session data: {0}")]
    Encode(String),

    /// Session identifier contains characters outside the allowed set.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Session is not active, so its variables cannot be touched.
    #[error("session not active: current state is {0:?}")]
    NotActive(crate::session::SessionState),

    /// Namespace is reserved for session bookkeeping.
    #[error("namespace {0:?} is reserved")]
    ReservedNamespace(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether this error came from the storage medium rather than the caller.
    pub fn is_backend_fault(&self) -> bool {
        matches!(
            self,
            SessionError::BackendFailure(_)
                | SessionError::Locked(_)
                | SessionError::LockPoisoned
                | SessionError::Io(_)
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::BackendFailure(e.to_string())
    }
}

/// Convenience Result type for session-vault operations.
pub type Result<T> = std::result::Result<T, SessionError>;
