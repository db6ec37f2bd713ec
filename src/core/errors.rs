//! Core error types

use thiserror::Error;

/// Core daemon errors
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("Addon error: {0}")]
    AddonError(String),

    #[error("X11 error: {0}")]
    X11Error(String),
}

impl CoreError {
    pub fn addon_error(msg: impl Into<String>) -> Self {
        Self::AddonError(msg.into())
    }

    pub fn x11_error(msg: impl Into<String>) -> Self {
        Self::X11Error(msg.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
