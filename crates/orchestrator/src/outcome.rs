//! Structured results for single-entity operations
//!
//! A failed lookup or a precondition violation is an expected answer for
//! these operations, not a fault, so they report `success: false` with an
//! [`ErrorPayload`] instead of returning `Err`.

use serde::Serialize;

use crate::error::{ErrorPayload, FleetError};

/// `{success, ...value}` or `{success: false, error}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(flatten)]
    pub value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(err: &FleetError) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(err.payload()),
        }
    }

    /// Borrow the successful value, if any
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_result(self) -> std::result::Result<T, ErrorPayload> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ErrorPayload {
                kind: robofleet_core::ErrorKind::Internal,
                message: "outcome carries neither value nor error".to_string(),
            }),
        }
    }
}

impl<T> From<std::result::Result<T, FleetError>> for Outcome<T> {
    fn from(result: std::result::Result<T, FleetError>) -> Self {
        match result {
            Ok(value) => Outcome::ok(value),
            Err(err) => Outcome::failed(&err),
        }
    }
}
