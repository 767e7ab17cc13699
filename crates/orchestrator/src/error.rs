//! Orchestrator error types

use robofleet_core::ErrorKind;
use robofleet_registry::RegistryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::SubmitError;

/// Errors surfaced by fleet operations
#[derive(Debug, Error)]
pub enum FleetError {
    /// Storage layer failure or rejected write
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Domain rule violation
    #[error(transparent)]
    Core(#[from] robofleet_core::Error),

    /// Task scheduler refused a job
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl FleetError {
    /// Classify for callers that only care about the category
    pub fn kind(&self) -> ErrorKind {
        match self {
            FleetError::Core(err) => err.kind(),
            FleetError::Submit(_) => ErrorKind::Internal,
            FleetError::Registry(err) => match err {
                RegistryError::NotFound { .. } => ErrorKind::NotFound,
                RegistryError::Transition(_) => ErrorKind::InvalidState,
                RegistryError::Conflict { .. } => ErrorKind::TransientConflict,
                RegistryError::Duplicate(_) | RegistryError::Validation(_) => {
                    ErrorKind::Validation
                }
                RegistryError::Database(rusqlite::Error::SqliteFailure(e, _))
                    if matches!(
                        e.code,
                        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                    ) =>
                {
                    ErrorKind::TransientConflict
                }
                RegistryError::Database(_) | RegistryError::Io(_) | RegistryError::Corrupt { .. } => {
                    ErrorKind::Internal
                }
            },
        }
    }

    /// Structured form carried in failed outcomes
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Error as reported to callers of single-entity operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, FleetError>;
