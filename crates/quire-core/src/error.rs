//! Error types for Quire.

use thiserror::Error;

/// Top-level result type for Quire operations.
pub type Result<T> = std::result::Result<T, QuireError>;

/// Top-level error type for Quire.
#[derive(Debug, Error)]
pub enum QuireError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("user '{user}' is not allowed to access '{resource}'")]
    Unauthorized { user: String, resource: String },

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("invalid document name '{0}'")]
    InvalidName(String),

    #[error("remote disconnected: {0}")]
    RemoteDisconnected(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification surfaced to callers that must tell a missing
/// project apart from a forbidden one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Failure,
}

impl QuireError {
    pub fn unauthorized(user: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::Unauthorized {
            user: user.into(),
            resource: resource.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            _ => ErrorKind::Failure,
        }
    }

    /// Message safe to show outside the process: no paths, no driver text.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(_) | Self::Malformed(_) | Self::InvalidName(_) => self.to_string(),
            Self::Unauthorized { .. } => "access denied".to_string(),
            _ => "storage operation failed".to_string(),
        }
    }
}

impl From<serde_json::Error> for QuireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
