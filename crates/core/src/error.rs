//! Error types for Helios.

use thiserror::Error;

/// Result type alias using Helios's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Helios.
///
/// Nonzero command exit is deliberately absent: it is carried as data in
/// `ExecResult` and surfaced by the command executor as a failure outcome,
/// never as an `Err`.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Lookup failures
    // =========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Workspace containment
    // =========================================================================
    #[error("Path escapes workspace: {0}")]
    PathEscape(String),

    // =========================================================================
    // Container lifecycle
    // =========================================================================
    #[error("Container name conflict: {0}")]
    NameConflict(String),

    #[error("Container runtime error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Generic
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a path-escape error.
    pub fn path_escape(msg: impl Into<String>) -> Self {
        Self::PathEscape(msg.into())
    }

    /// Create a name-conflict error.
    pub fn name_conflict(msg: impl Into<String>) -> Self {
        Self::NameConflict(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error indicates the referenced container/record is gone.
    ///
    /// The registry uses this to decide between evicting a stale entry and
    /// propagating a real fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
