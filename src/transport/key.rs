//! Per-request transport resolution.
//!
//! A backend's origin and hostname may be dynamic expressions, so the
//! effective transport configuration is a pure function of (static config,
//! request context) recomputed per request. The cache in `pool.rs` is keyed
//! on the *output* of this function, never on the raw config.

use std::time::Duration;

use axum::http::Request;
use bytes::Bytes;
use url::Url;

use crate::config::schema::BackendConfig;
use crate::context::TokenEndpoint;
use crate::error::GatewayError;
use crate::eval::ExpressionEvaluator;

/// Effective transport identity for one request. Everything that affects
/// pooling behavior participates in equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey {
    /// Resolved scheme ("http" or "https").
    pub scheme: String,
    /// Resolved origin authority, host with optional port.
    pub origin: String,
    /// Host header value for virtual-hosted origins.
    pub hostname: String,
    /// Backend name; synthetic "oauth2-<endpoint>" for token traffic.
    pub backend: String,
    /// Connection establishment timeout baked into the pooled connector.
    pub connect_timeout: Option<Duration>,
    /// Whether the connector honors proxy environment variables.
    pub proxy_from_env: bool,
}

fn parse_origin(raw: &str, what: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw)
        .map_err(|err| GatewayError::ConfigEvaluation(format!("{what} {raw:?}: {err}")))?;
    if url.host_str().is_none() {
        return Err(GatewayError::ConfigEvaluation(format!(
            "{what} {raw:?}: missing host"
        )));
    }
    Ok(url)
}

fn authority(url: &Url) -> String {
    // host_str presence is checked by parse_origin
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Resolve the effective transport for this request.
///
/// Token-endpoint traffic (tagged via [`TokenEndpoint`]) gets its own
/// synthetic backend identity so it never shares a connection pool with
/// resource traffic.
pub fn resolve(
    req: &Request<Bytes>,
    conf: &BackendConfig,
    expr: &dyn ExpressionEvaluator,
) -> Result<TransportKey, GatewayError> {
    let origin_raw = expr
        .evaluate(&conf.origin, req)
        .map_err(|err| GatewayError::ConfigEvaluation(format!("origin: {err}")))?;
    let origin_url = parse_origin(&origin_raw, "origin")?;
    let origin = authority(&origin_url);

    let hostname = match &conf.hostname {
        Some(raw) => {
            let value = expr
                .evaluate(raw, req)
                .map_err(|err| GatewayError::ConfigEvaluation(format!("hostname: {err}")))?;
            if value.is_empty() {
                origin.clone()
            } else {
                value
            }
        }
        None => origin.clone(),
    };

    let mut key = TransportKey {
        scheme: origin_url.scheme().to_string(),
        origin,
        hostname,
        backend: conf.name.clone(),
        connect_timeout: conf.timeouts().connect,
        proxy_from_env: conf.proxy_from_env,
    };

    if let Some(TokenEndpoint(endpoint)) = req.extensions().get::<TokenEndpoint>() {
        if !endpoint.is_empty() {
            let url = parse_origin(endpoint, "token endpoint")?;
            key.scheme = url.scheme().to_string();
            key.origin = authority(&url);
            key.hostname = key.origin.clone();
            key.backend = format!("oauth2-{endpoint}");
        }
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalError, LiteralEvaluator};

    fn backend(origin: &str) -> BackendConfig {
        toml::from_str(&format!("name = \"origin-1\"\norigin = {origin:?}\n")).unwrap()
    }

    fn request() -> Request<Bytes> {
        Request::builder().body(Bytes::new()).unwrap()
    }

    #[test]
    fn hostname_defaults_to_origin_authority() {
        let conf = backend("http://origin.test:8080");
        let key = resolve(&request(), &conf, &LiteralEvaluator).unwrap();
        assert_eq!(key.scheme, "http");
        assert_eq!(key.origin, "origin.test:8080");
        assert_eq!(key.hostname, "origin.test:8080");
        assert_eq!(key.backend, "origin-1");
    }

    #[test]
    fn explicit_hostname_wins() {
        let mut conf = backend("http://origin.test:8080");
        conf.hostname = Some("api.example.org".to_string());
        let key = resolve(&request(), &conf, &LiteralEvaluator).unwrap();
        assert_eq!(key.hostname, "api.example.org");
    }

    #[test]
    fn token_endpoint_gets_synthetic_identity() {
        let conf = backend("http://origin.test:8080");
        let mut req = request();
        req.extensions_mut()
            .insert(TokenEndpoint("https://auth.test/token".to_string()));

        let key = resolve(&req, &conf, &LiteralEvaluator).unwrap();
        assert_eq!(key.scheme, "https");
        assert_eq!(key.origin, "auth.test");
        assert_eq!(key.hostname, "auth.test");
        assert_eq!(key.backend, "oauth2-https://auth.test/token");
    }

    #[test]
    fn invalid_origin_is_a_config_evaluation_error() {
        let conf = backend("not a url");
        let err = resolve(&request(), &conf, &LiteralEvaluator).unwrap_err();
        assert!(matches!(err, GatewayError::ConfigEvaluation(_)));
    }

    #[test]
    fn evaluator_failure_is_surfaced() {
        struct Failing;
        impl ExpressionEvaluator for Failing {
            fn evaluate(&self, _raw: &str, _req: &Request<Bytes>) -> Result<String, EvalError> {
                Err(EvalError::new("unknown variable"))
            }
        }

        let conf = backend("http://${backend_host}");
        let err = resolve(&request(), &conf, &Failing).unwrap_err();
        match err {
            GatewayError::ConfigEvaluation(msg) => assert!(msg.contains("unknown variable")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn keys_differing_only_in_hostname_are_distinct() {
        let conf = backend("http://origin.test:8080");
        let a = resolve(&request(), &conf, &LiteralEvaluator).unwrap();

        let mut with_hostname = conf.clone();
        with_hostname.hostname = Some("other.test".to_string());
        let b = resolve(&request(), &with_hostname, &LiteralEvaluator).unwrap();

        assert_ne!(a, b);
    }
}
