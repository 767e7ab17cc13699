//! Scheduler error types

use robofleet_orchestrator::{FleetError, SubmitError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The job itself failed
    #[error(transparent)]
    Fleet(#[from] FleetError),

    /// A follow-up job could not be queued
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// Job result could not be encoded
    #[error("Result encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The blocking worker panicked or was cancelled
    #[error("Worker aborted: {0}")]
    Worker(String),

    /// Created outside a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
