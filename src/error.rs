//! Error type shared by every store, collaborator and screen.
//!
//! Backend failures keep the backend's raw message text; screens show the
//! `Display` output inline next to the control that triggered the action.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosError {
    /// Rejected before any request was issued (empty cart, bad form input).
    #[error("{0}")]
    Validation(String),

    /// The tabular backend, auth service or object storage refused the request.
    #[error("{0}")]
    Backend(String),

    /// Absent data: unknown barcode, unknown shop slug, missing row.
    #[error("{0}")]
    NotFound(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Local sqlite or filesystem failure.
    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Http(String),

    #[error("Invalid data: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PosResult<T> = Result<T, PosError>;

impl PosError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<rusqlite::Error> for PosError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for PosError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for PosError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Storage(format!("lock poisoned: {e}"))
    }
}
