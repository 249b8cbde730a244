//! Error types for tessera-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("{0} is not a legal path")]
    IllegalPath(String),

    #[error("Invalid level {level} for path {path}")]
    InvalidLevel { path: String, level: i32 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
