//! Error types for session orchestration
//!
//! Provider-facing failures are absorbed at the boundary and never reach
//! callers of the controller. Only programming errors surface here.

use thiserror::Error;

/// Errors raised synchronously by [`crate::session::SessionController`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Missing scope parameter, unknown media mode or unknown show-data type
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
}

/// Errors from starting a playback backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} not found. Install it first.")]
    NotFound(String),

    #[error("No cast device selected")]
    NoDevice,

    #[error("Backend failed to start: {0}")]
    StartFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
