//! CORS negotiation.
//!
//! A stateless, per-request decision over `(CorsOptions, request headers)`.
//! Preflight requests are answered with 204 and never reach the backend.
//! See <https://fetch.spec.whatwg.org/#http-responses> for the wildcard
//! versus credentialed-echo rules.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use bytes::Bytes;

use crate::config::schema::CorsConfig;

const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
const MAX_AGE: &str = "Access-Control-Max-Age";
const REQUEST_METHOD: &str = "Access-Control-Request-Method";
const REQUEST_HEADERS: &str = "Access-Control-Request-Headers";

/// Immutable CORS policy derived from configuration.
#[derive(Debug, Clone)]
pub struct CorsOptions {
    allowed_origins: Vec<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsOptions {
    /// Derive the policy; `None` when the block is absent or disabled.
    pub fn from_config(conf: &CorsConfig) -> Option<Self> {
        if conf.disable || conf.allowed_origins.is_empty() {
            return None;
        }
        Some(Self {
            allowed_origins: conf
                .allowed_origins
                .iter()
                .map(|origin| origin.to_lowercase())
                .collect(),
            allow_credentials: conf.allow_credentials,
            max_age: (conf.max_age_secs > 0).then(|| Duration::from_secs(conf.max_age_secs)),
        })
    }

    /// Case-insensitive origin match; `*` matches any origin.
    pub fn allows_origin(&self, origin: &str) -> bool {
        let origin = origin.to_lowercase();
        self.allowed_origins
            .iter()
            .any(|allowed| *allowed == origin || allowed == "*")
    }

    /// Responses vary by origin whenever the wildcard is not allowed
    /// unconditionally, so caches must key on `Origin`.
    pub fn needs_vary(&self) -> bool {
        !self.allows_origin("*")
    }
}

/// A request is a CORS request iff it carries an `Origin` header.
pub fn is_cors_request(headers: &HeaderMap) -> bool {
    headers.contains_key(header::ORIGIN)
}

/// Preflight: OPTIONS with a requested method or requested headers.
pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && (headers.contains_key(REQUEST_METHOD) || headers.contains_key(REQUEST_HEADERS))
}

fn is_credentialed(headers: &HeaderMap) -> bool {
    headers.contains_key(header::COOKIE)
        || headers.contains_key(header::AUTHORIZATION)
        || headers.contains_key(header::PROXY_AUTHORIZATION)
}

/// Decorate a response with CORS headers for the given request.
pub fn apply_response_headers(
    options: &CorsOptions,
    method: &Method,
    req_headers: &HeaderMap,
    resp_headers: &mut HeaderMap,
) {
    if !is_cors_request(req_headers) {
        return;
    }
    let Some(origin) = req_headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };
    if !options.allows_origin(origin) {
        return;
    }

    if options.allows_origin("*") && !is_credentialed(req_headers) {
        resp_headers.insert(ALLOW_ORIGIN, HeaderValue::from_static("*"));
    } else if let Ok(value) = HeaderValue::from_str(origin) {
        resp_headers.insert(ALLOW_ORIGIN, value);
    }

    if options.allow_credentials {
        resp_headers.insert(ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }

    if is_preflight(method, req_headers) {
        // Reflect the requested method/headers verbatim.
        if let Some(acrm) = req_headers.get(REQUEST_METHOD) {
            resp_headers.insert(ALLOW_METHODS, acrm.clone());
        }
        if let Some(acrh) = req_headers.get(REQUEST_HEADERS) {
            resp_headers.insert(ALLOW_HEADERS, acrh.clone());
        }
        if let Some(max_age) = options.max_age {
            if let Ok(value) = HeaderValue::from_str(&max_age.as_secs().to_string()) {
                resp_headers.insert(MAX_AGE, value);
            }
        }
    } else if options.needs_vary() {
        resp_headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// Answer a preflight request without invoking the backend.
pub fn preflight_response(options: &CorsOptions, req: &Request<Bytes>) -> Response<Bytes> {
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = StatusCode::NO_CONTENT;
    apply_response_headers(options, req.method(), req.headers(), resp.headers_mut());
    resp
}
