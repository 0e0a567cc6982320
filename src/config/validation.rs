//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing backends and
//!   access controls)
//! - Validate literal origin URLs and credential formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Runs before config is accepted into the system; a route referencing
//!   an undefined control or backend never becomes a runtime error

use std::collections::HashSet;

use crate::config::schema::GatewayConfig;

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn error(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

/// Origins are treated as expressions when they contain a template marker;
/// only literal origins can be checked at load time.
fn is_literal(value: &str) -> bool {
    !value.contains("${")
}

/// Validate the configuration. Pure function over the parsed config.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut backend_names = HashSet::new();
    for backend in &config.backends {
        if backend.name.is_empty() {
            errors.push(error("backends.name", "must not be empty"));
        }
        if !backend_names.insert(backend.name.as_str()) {
            errors.push(error(
                "backends.name",
                format!("duplicate backend {:?}", backend.name),
            ));
        }
        if backend.origin.is_empty() {
            errors.push(error(
                format!("backends.{}.origin", backend.name),
                "must not be empty",
            ));
        } else if is_literal(&backend.origin) && url::Url::parse(&backend.origin).is_err() {
            errors.push(error(
                format!("backends.{}.origin", backend.name),
                format!("invalid origin URL {:?}", backend.origin),
            ));
        }
        if let Some(credentials) = &backend.basic_auth {
            if !credentials.contains(':') {
                errors.push(error(
                    format!("backends.{}.basic_auth", backend.name),
                    "expected \"user:password\"",
                ));
            }
        }
    }

    let control_names: HashSet<&str> = config
        .access_controls
        .iter()
        .map(|ac| ac.name.as_str())
        .collect();

    for name in &config.access_control {
        if !control_names.contains(name.as_str()) {
            errors.push(error(
                "access_control",
                format!("access control is not defined: {name:?}"),
            ));
        }
    }

    for (i, route) in config.routes.iter().enumerate() {
        if !route.path_prefix.starts_with('/') {
            errors.push(error(
                format!("routes[{i}].path_prefix"),
                "must start with '/'",
            ));
        }
        if !backend_names.contains(route.backend.as_str()) {
            errors.push(error(
                format!("routes[{i}].backend"),
                format!("backend is not defined: {:?}", route.backend),
            ));
        }
        for name in route
            .access_control
            .iter()
            .chain(&route.disable_access_control)
        {
            if !control_names.contains(name.as_str()) {
                errors.push(error(
                    format!("routes[{i}].access_control"),
                    format!("access control is not defined: {name:?}"),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
