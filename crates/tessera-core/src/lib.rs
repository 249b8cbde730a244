//! Tessera Core - Shared types for the Tessera time series cluster
//!
//! This crate provides the fundamental pieces used by the cluster executor
//! and the logical planner:
//! - `PartialPath`: dot-delimited metadata path, possibly holding `*`/`**` wildcards
//! - `CoreError`: path and configuration errors
//! - `logging`: tracing subscriber setup shared by binaries and tests

pub mod error;
pub mod logging;
pub mod path;

pub use error::{CoreError, Result};
pub use logging::{init_logging, LoggingSettings};
pub use path::{
    PartialPath, MULTI_LEVEL_PATH_WILDCARD, ONE_LEVEL_PATH_WILDCARD, PATH_ROOT,
};
