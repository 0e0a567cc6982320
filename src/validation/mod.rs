//! Schema-validation collaborator contract.
//!
//! OpenAPI validation internals are external to this crate. Backends
//! reference a named validator; the registry resolves that reference at
//! configuration time so a dangling name never becomes a runtime error.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{Request, Response};
use bytes::Bytes;
use thiserror::Error;

use crate::config::loader::ConfigError;

/// A single schema violation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SchemaViolation(pub String);

/// Stateless request/response validator. May be absent (disabled).
pub trait SchemaValidator: Send + Sync {
    fn validate_request(&self, req: &Request<Bytes>) -> Result<(), SchemaViolation>;

    fn validate_response(&self, resp: &Response<Bytes>) -> Result<(), SchemaViolation>;
}

impl std::fmt::Debug for dyn SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SchemaValidator")
    }
}

/// Per-backend validation behavior derived from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    pub ignore_request_violations: bool,
    pub ignore_response_violations: bool,
}

/// Named validators supplied by the embedding application.
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn SchemaValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, validator: Arc<dyn SchemaValidator>) {
        self.validators.insert(name.into(), validator);
    }

    /// Resolve a configured validator reference. Unknown names are a
    /// configuration-load failure.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SchemaValidator>, ConfigError> {
        self.validators
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownValidator(name.to_string()))
    }
}
