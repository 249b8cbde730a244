//! Planner error types

use tessera_core::CoreError;
use thiserror::Error;

/// Planning errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Authorization error: {0}")]
    Auth(String),

    #[error(transparent)]
    Path(#[from] CoreError),
}

/// Result type for planning
pub type Result<T> = std::result::Result<T, QueryError>;
