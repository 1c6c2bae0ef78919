use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::checkout::CheckoutError;
use crate::notify::MailerError;
use crate::store::StoreError;

/// Field-keyed validation failures, shaped for a `{"field": "message"}` JSON body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub BTreeMap<&'static str, &'static str>);

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: &'static str) {
        self.0.insert(field, message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.keys().copied().collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Pipeline error taxonomy.
///
/// `Authentication` deliberately carries no detail: callers must not be able
/// to distinguish a bad signature from an expired link. `Conflict` is the
/// success-like "already processed" case, not a failure. Only `Dependency`
/// on a critical path becomes a 500.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("invalid or expired action link")]
    Authentication,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("inquiry already processed")]
    Conflict,
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl From<StoreError> for FlowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => FlowError::NotFound("record"),
            StoreError::StatusConflict { .. } => FlowError::Conflict,
            StoreError::Unavailable(detail) => FlowError::Dependency(detail),
        }
    }
}

impl From<MailerError> for FlowError {
    fn from(value: MailerError) -> Self {
        FlowError::Dependency(value.to_string())
    }
}

impl From<CheckoutError> for FlowError {
    fn from(value: CheckoutError) -> Self {
        FlowError::Dependency(value.to_string())
    }
}
