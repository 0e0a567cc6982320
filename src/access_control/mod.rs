//! Ordered, named access-control chain.
//!
//! A route declares which named controls apply; evaluation is a strict
//! conjunction with early exit. The first failure short-circuits the rest
//! and is surfaced as the request's terminal error, tagged with the failing
//! control's name. Referencing an undefined control is a configuration-load
//! error, never a runtime one.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::schema::{AccessControlConfig, AccessControlKind};
use crate::error::GatewayError;

/// Typed failure returned by a single control.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessControlError {
    #[error("credentials missing")]
    MissingCredentials,

    #[error("credentials rejected")]
    InvalidCredentials,

    #[error("{0}")]
    Denied(String),
}

/// A predicate over a request. Implementations must be cheap to call and
/// free of per-request state.
pub trait AccessControl: Send + Sync {
    fn validate(&self, req: &Request<Bytes>) -> Result<(), AccessControlError>;
}

impl<F> AccessControl for F
where
    F: Fn(&Request<Bytes>) -> Result<(), AccessControlError> + Send + Sync,
{
    fn validate(&self, req: &Request<Bytes>) -> Result<(), AccessControlError> {
        self(req)
    }
}

/// Compares `Authorization: Basic` credentials against a configured pair.
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl AccessControl for BasicAuth {
    fn validate(&self, req: &Request<Bytes>) -> Result<(), AccessControlError> {
        let value = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AccessControlError::MissingCredentials)?;

        let encoded = value
            .strip_prefix("Basic ")
            .ok_or(AccessControlError::MissingCredentials)?;
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| AccessControlError::InvalidCredentials)?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| AccessControlError::InvalidCredentials)?;

        match decoded.split_once(':') {
            Some((user, password)) if user == self.user && password == self.password => Ok(()),
            _ => Err(AccessControlError::InvalidCredentials),
        }
    }
}

/// Requires a non-empty bearer token; the token itself is verified elsewhere.
pub struct TokenPresent;

impl AccessControl for TokenPresent {
    fn validate(&self, req: &Request<Bytes>) -> Result<(), AccessControlError> {
        let value = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AccessControlError::MissingCredentials)?;
        match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(()),
            _ => Err(AccessControlError::MissingCredentials),
        }
    }
}

/// Name → control capability. Populated from configuration plus any controls
/// the embedding application registers directly.
#[derive(Default, Clone)]
pub struct ControlMap {
    controls: HashMap<String, Arc<dyn AccessControl>>,
}

impl ControlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[AccessControlConfig]) -> Self {
        let mut map = Self::new();
        for conf in configs {
            let control: Arc<dyn AccessControl> = match &conf.kind {
                AccessControlKind::BasicAuth { user, password } => {
                    Arc::new(BasicAuth::new(user.clone(), password.clone()))
                }
                AccessControlKind::TokenPresent => Arc::new(TokenPresent),
            };
            map.insert(conf.name.clone(), control);
        }
        map
    }

    pub fn insert(&mut self, name: impl Into<String>, control: Arc<dyn AccessControl>) {
        self.controls.insert(name.into(), control);
    }

    /// Build the ordered chain for a route: inherited names plus the route's
    /// own, minus explicitly disabled ones. Order of `applied` is preserved.
    pub fn chain(
        &self,
        applied: &[String],
        disabled: &[String],
    ) -> Result<AccessControlChain, ConfigError> {
        let mut controls = Vec::new();
        for name in applied {
            if disabled.contains(name) {
                continue;
            }
            let control = self
                .controls
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownAccessControl(name.clone()))?;
            controls.push((name.clone(), control));
        }
        Ok(AccessControlChain { controls })
    }
}

/// Ordered conjunction of named controls for one route.
#[derive(Clone, Default)]
pub struct AccessControlChain {
    controls: Vec<(String, Arc<dyn AccessControl>)>,
}

impl std::fmt::Debug for AccessControlChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlChain")
            .field(
                "controls",
                &self.controls.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AccessControlChain {
    /// Every control must pass; the first failure wins and names the control.
    pub fn validate(&self, req: &Request<Bytes>) -> Result<(), GatewayError> {
        for (name, control) in &self.controls {
            control
                .validate(req)
                .map_err(|source| GatewayError::AccessControlDenied {
                    control: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> Request<Bytes> {
        Request::builder().body(Bytes::new()).unwrap()
    }

    fn request_with_auth(value: &str) -> Request<Bytes> {
        Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn basic_auth_accepts_matching_credentials() {
        let control = BasicAuth::new("alice", "secret");
        let encoded = BASE64.encode("alice:secret");
        let req = request_with_auth(&format!("Basic {encoded}"));
        assert!(control.validate(&req).is_ok());
    }

    #[test]
    fn basic_auth_rejects_wrong_password() {
        let control = BasicAuth::new("alice", "secret");
        let encoded = BASE64.encode("alice:wrong");
        let req = request_with_auth(&format!("Basic {encoded}"));
        assert_eq!(
            control.validate(&req),
            Err(AccessControlError::InvalidCredentials)
        );
    }

    #[test]
    fn basic_auth_requires_header() {
        let control = BasicAuth::new("alice", "secret");
        assert_eq!(
            control.validate(&request()),
            Err(AccessControlError::MissingCredentials)
        );
    }

    #[test]
    fn token_present() {
        assert!(TokenPresent
            .validate(&request_with_auth("Bearer abc"))
            .is_ok());
        assert_eq!(
            TokenPresent.validate(&request_with_auth("Bearer ")),
            Err(AccessControlError::MissingCredentials)
        );
    }

    #[test]
    fn chain_short_circuits_on_first_failure() {
        let calls = Arc::new(AtomicU32::new(0));

        let mut map = ControlMap::new();
        map.insert(
            "first",
            Arc::new(|_: &Request<Bytes>| Err(AccessControlError::Denied("nope".into()))),
        );
        let calls_second = calls.clone();
        map.insert(
            "second",
            Arc::new(move |_: &Request<Bytes>| {
                calls_second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let chain = map
            .chain(&["first".into(), "second".into()], &[])
            .unwrap();
        let err = chain.validate(&request()).unwrap_err();
        match err {
            GatewayError::AccessControlDenied { control, .. } => assert_eq!(control, "first"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn chain_is_a_conjunction() {
        let mut map = ControlMap::new();
        map.insert("a", Arc::new(|_: &Request<Bytes>| Ok(())));
        map.insert("b", Arc::new(|_: &Request<Bytes>| Ok(())));

        let chain = map.chain(&["a".into(), "b".into()], &[]).unwrap();
        assert!(chain.validate(&request()).is_ok());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn disabled_controls_are_skipped() {
        let mut map = ControlMap::new();
        map.insert(
            "deny",
            Arc::new(|_: &Request<Bytes>| Err(AccessControlError::Denied("nope".into()))),
        );

        let chain = map.chain(&["deny".into()], &["deny".into()]).unwrap();
        assert!(chain.is_empty());
        assert!(chain.validate(&request()).is_ok());
    }

    #[test]
    fn undefined_control_is_config_error() {
        let map = ControlMap::new();
        let err = map.chain(&["ghost".into()], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAccessControl(name) if name == "ghost"));
    }
}
