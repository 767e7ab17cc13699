//! Core error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transitions::TransitionError;

/// Classification carried into operation outcomes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced robot or mission does not exist
    NotFound,
    /// Entity status forbids the operation
    InvalidState,
    /// Optimistic update lost a race
    TransientConflict,
    /// Malformed input
    Validation,
    /// Storage or runtime failure
    Internal,
}

/// Core error type for Robofleet
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// "Robot" or "Mission"
        entity: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Operation not allowed in the entity's current status
    #[error("{0}")]
    InvalidState(String),

    /// Status change is not a declared edge
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Conditional update observed a changed precondition
    #[error("Conflicting update: {0}")]
    TransientConflict(String),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn robot_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            entity: "Robot",
            id: id.to_string(),
        }
    }

    pub fn mission_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            entity: "Mission",
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidState(_) | Error::InvalidTransition(_) => ErrorKind::InvalidState,
            Error::TransientConflict(_) => ErrorKind::TransientConflict,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Config(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
