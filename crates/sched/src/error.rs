//! Scheduler error types.

use thiserror::Error;

use quiver_core::QuiverError;

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("no cpu resource registered")]
    NoCpuResource,

    #[error("config error: {0}")]
    Config(#[from] QuiverError),
}
