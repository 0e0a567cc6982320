//! Backend round-tripper: one upstream exchange per call.
//!
//! Orchestrates timeout layering, header normalization, compression
//! negotiation, context evaluation, schema validation, token-cache
//! invalidation, and response assembly. Network failures propagate as
//! transport errors and are never retried here; retry policy belongs to
//! the caller.

use std::io::Read as _;
use std::sync::{Arc, LazyLock};

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use flate2::read::GzDecoder;
use regex::Regex;

use crate::config::schema::BackendConfig;
use crate::context::{
    self, ProxyRelayed, ResourceRequest, SharedRoundtripInfo, TokenKey, UpstreamRequest,
};
use crate::error::{GatewayError, TimeoutDomain};
use crate::eval::{ContextEvaluator, ExpressionEvaluator, LiteralEvaluator};
use crate::token::TokenStore;
use crate::transport::key;
use crate::transport::pool::TransportPool;
use crate::validation::{SchemaValidator, ValidationOptions};

const GZIP: &str = "gzip";

/// Case-insensitive word-boundary match, so "br, gzip" qualifies but
/// "supergzipped" does not.
static CLIENT_SUPPORTS_GZIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bgzip\b").expect("static pattern"));

/// One logical backend. Cheap to clone per route; all heavy state lives in
/// the shared transport pool and token store.
pub struct Backend {
    conf: Arc<BackendConfig>,
    pool: Arc<TransportPool>,
    tokens: Arc<TokenStore>,
    expr: Arc<dyn ExpressionEvaluator>,
    evaluator: Option<Arc<dyn ContextEvaluator>>,
    validator: Option<Arc<dyn SchemaValidator>>,
    validation: ValidationOptions,
    max_body_bytes: usize,
}

impl Backend {
    pub fn new(conf: Arc<BackendConfig>, pool: Arc<TransportPool>, tokens: Arc<TokenStore>) -> Self {
        Self {
            conf,
            pool,
            tokens,
            expr: Arc::new(LiteralEvaluator),
            evaluator: None,
            validator: None,
            validation: ValidationOptions::default(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }

    /// Plug in the expression engine used for origin/hostname resolution.
    pub fn with_expression_evaluator(mut self, expr: Arc<dyn ExpressionEvaluator>) -> Self {
        self.expr = expr;
        self
    }

    /// Plug in configured request/response context expressions.
    pub fn with_context_evaluator(mut self, evaluator: Arc<dyn ContextEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_validator(
        mut self,
        validator: Arc<dyn SchemaValidator>,
        options: ValidationOptions,
    ) -> Self {
        self.validator = Some(validator);
        self.validation = options;
        self
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn name(&self) -> &str {
        &self.conf.name
    }

    /// Perform one upstream exchange. The overall timeout bounds the whole
    /// call including response-body buffering, so cancelling the deadline
    /// never blocks on a slow body read.
    pub async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, GatewayError> {
        match self.conf.timeouts().total {
            Some(limit) => tokio::time::timeout(limit, self.exchange(req))
                .await
                .map_err(|_| GatewayError::Timeout {
                    domain: TimeoutDomain::Total,
                    limit,
                })?,
            None => self.exchange(req).await,
        }
    }

    async fn exchange(&self, mut req: Request<Bytes>) -> Result<Response<Bytes>, GatewayError> {
        let info = req.extensions().get::<SharedRoundtripInfo>().cloned();

        let key = key::resolve(&req, &self.conf, self.expr.as_ref())?;
        let client = self.pool.get_or_create(&key);

        rewrite_uri(&mut req, &key)?;
        let host = HeaderValue::from_str(&key.hostname)
            .map_err(|_| GatewayError::ConfigEvaluation(format!("hostname {:?}", key.hostname)))?;
        req.headers_mut().insert(header::HOST, host);

        if let Some(ref info) = info {
            let method = req.method().clone();
            let uri = req.uri().clone();
            context::record(info, |i| {
                i.backend = key.backend.clone();
                i.method = Some(method);
                i.uri = Some(uri);
            });
        }

        // Ordering is fixed: context evaluation, then static auth injection,
        // then hop-header stripping.
        if let Some(evaluator) = &self.evaluator {
            evaluator.evaluate_request(&mut req).await?;
        }

        if let Some(credentials) = &self.conf.basic_auth {
            let auth = format!("Basic {}", BASE64.encode(credentials));
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| GatewayError::ConfigEvaluation("basic_auth credentials".into()))?;
            req.headers_mut().insert(header::AUTHORIZATION, value);
        }

        // The embedding proxy layer marks its roundtrips; headers must not
        // be processed twice.
        let relayed = req.extensions().get::<ProxyRelayed>().is_some();
        if !relayed {
            remove_connection_headers(req.headers_mut());
            remove_hop_headers(req.headers_mut());
        }

        negotiate_compression(req.headers_mut());

        if let Some(validator) = &self.validator {
            if let Err(violation) = validator.validate_request(&req) {
                if let Some(ref info) = info {
                    context::record(info, |i| i.validation_errors.push(violation.to_string()));
                }
                if !self.validation.ignore_request_violations {
                    return Err(GatewayError::UpstreamRequestValidation);
                }
            }
        }

        ensure_user_agent(req.headers_mut());

        let upstream = UpstreamRequest {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        };
        let token_key = req.extensions().get::<TokenKey>().cloned();
        let is_resource = req.extensions().get::<ResourceRequest>().is_some();

        let mut beresp = self.send(&client, req).await?;

        if let Some(ref info) = info {
            let status = beresp.status();
            context::record(info, |i| i.status = Some(status));
        }

        // A 401 on a resource request kills the cached token so the next
        // attempt re-authenticates, regardless of how this response is
        // ultimately surfaced.
        if is_resource && beresp.status() == StatusCode::UNAUTHORIZED {
            if let Some(TokenKey(key)) = token_key {
                if !key.is_empty() {
                    self.tokens.del(&key);
                }
            }
        }

        if let Some(validator) = &self.validator {
            if let Err(violation) = validator.validate_response(&beresp) {
                if let Some(ref info) = info {
                    context::record(info, |i| i.validation_errors.push(violation.to_string()));
                }
                if !self.validation.ignore_response_violations {
                    return Err(GatewayError::UpstreamResponseValidation);
                }
            }
        }

        decompress_gzip(&mut beresp, self.max_body_bytes);

        if !relayed {
            remove_connection_headers(beresp.headers_mut());
            remove_hop_headers(beresp.headers_mut());
        }

        if let Some(evaluator) = &self.evaluator {
            evaluator.evaluate_response(&mut beresp).await?;
        }

        beresp.extensions_mut().insert(upstream);
        Ok(beresp)
    }

    /// Network exchange with the time-to-first-byte timeout on the response
    /// head; the body read is bounded only by the overall deadline.
    async fn send(
        &self,
        client: &hyper_util::client::legacy::Client<
            hyper_util::client::legacy::connect::HttpConnector,
            Body,
        >,
        req: Request<Bytes>,
    ) -> Result<Response<Bytes>, GatewayError> {
        let (parts, bytes) = req.into_parts();
        let outreq = Request::from_parts(parts, Body::from(bytes));

        let head = client.request(outreq);
        let resp = match self.conf.timeouts().ttfb {
            Some(limit) => tokio::time::timeout(limit, head)
                .await
                .map_err(|_| GatewayError::Timeout {
                    domain: TimeoutDomain::FirstByte,
                    limit,
                })?,
            None => head.await,
        }
        .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let (parts, incoming) = resp.into_parts();
        let bytes = axum::body::to_bytes(Body::new(incoming), self.max_body_bytes)
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Response::from_parts(parts, bytes))
    }
}

fn rewrite_uri(req: &mut Request<Bytes>, key: &key::TransportKey) -> Result<(), GatewayError> {
    let mut parts = req.uri().clone().into_parts();
    parts.scheme = Some(
        Scheme::try_from(key.scheme.as_str())
            .map_err(|_| GatewayError::ConfigEvaluation(format!("scheme {:?}", key.scheme)))?,
    );
    parts.authority = Some(
        Authority::try_from(key.origin.as_str())
            .map_err(|_| GatewayError::ConfigEvaluation(format!("origin {:?}", key.origin)))?,
    );
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    *req.uri_mut() = Uri::from_parts(parts)
        .map_err(|err| GatewayError::ConfigEvaluation(format!("request uri: {err}")))?;
    Ok(())
}

/// Force `Accept-Encoding: gzip` when the client can handle it; drop the
/// header otherwise so the transport never requests a codec the caller
/// did not ask for.
fn negotiate_compression(headers: &mut HeaderMap) {
    let accepts = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if CLIENT_SUPPORTS_GZIP.is_match(accepts) {
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(GZIP));
    } else {
        headers.remove(header::ACCEPT_ENCODING);
    }
}

/// Transparently decode a gzip response body and fix up the headers.
/// Decode failures leave the response untouched; availability wins over
/// strictness for this transform.
fn decompress_gzip(resp: &mut Response<Bytes>, max_body_bytes: usize) {
    let is_gzip = resp
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case(GZIP));
    if !is_gzip {
        return;
    }

    let mut decoded = Vec::new();
    let mut decoder = GzDecoder::new(resp.body().as_ref()).take(max_body_bytes as u64 + 1);
    if decoder.read_to_end(&mut decoded).is_err() || decoded.len() > max_body_bytes {
        return;
    }

    resp.headers_mut().remove(header::CONTENT_ENCODING);
    resp.headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(decoded.len()));
    *resp.body_mut() = Bytes::from(decoded);
}

/// Prevent the client library's default User-Agent from leaking upstream.
fn ensure_user_agent(headers: &mut HeaderMap) {
    let present = headers
        .get(header::USER_AGENT)
        .is_some_and(|v| !v.is_empty());
    if !present {
        headers.insert(header::USER_AGENT, HeaderValue::from_static(""));
    }
}

/// Remove hop-by-hop headers listed in the "Connection" header.
/// See RFC 7230, section 6.1.
pub(crate) fn remove_connection_headers(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    for name in listed {
        headers.remove(name.as_str());
    }
}

/// Hop-by-hop headers removed when sent to the backend. The RFC 2616 set,
/// kept for backward compatibility, plus the non-standard Proxy-Connection
/// still sent by libcurl.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn remove_hop_headers(headers: &mut HeaderMap) {
    for &name in HOP_HEADERS {
        let Some(value) = headers.get(name) else {
            continue;
        };
        if name == "te" && value.as_bytes() == b"trailers" {
            // Tell backend applications that care about trailer support
            // that we support trailers.
            continue;
        }
        headers.remove(name);
    }
}
