//! Per-request metadata carried through `http::Extensions`.
//!
//! The round-trip pipeline has two layers (reverse-proxy adapter and backend
//! round-tripper) that must not double-process hop-by-hop headers, and an
//! OAuth2 flow that reroutes single requests to a token endpoint. Both are
//! modeled as explicit extension values instead of type-switching on the
//! caller, keeping a single round-tripper implementation.

use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;

/// Marker: the request is already being relayed by the embedding
/// reverse-proxy layer, which has handled hop-by-hop headers.
#[derive(Debug, Clone, Copy)]
pub struct ProxyRelayed;

/// Token-endpoint override set by an upstream OAuth2 flow. The transport
/// resolver substitutes this endpoint for the configured origin.
#[derive(Debug, Clone)]
pub struct TokenEndpoint(pub String);

/// Cache key of the bearer token used for this resource request.
#[derive(Debug, Clone)]
pub struct TokenKey(pub String);

/// Marker: this is a resource request authenticated with a cached token,
/// eligible for token invalidation on an upstream 401.
#[derive(Debug, Clone, Copy)]
pub struct ResourceRequest;

/// The outgoing request as it was sent upstream, attached to the response
/// for downstream consumers (logging).
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Per-request scratch record written by the round-tripper and consumed by
/// the upstream log once the exchange completes.
#[derive(Debug, Default)]
pub struct RoundtripInfo {
    pub backend: String,
    pub method: Option<Method>,
    pub uri: Option<Uri>,
    pub status: Option<StatusCode>,
    pub transport_error: Option<String>,
    pub validation_errors: Vec<String>,
}

/// Shared handle to the scratch record, inserted into request extensions
/// for the duration of one exchange.
pub type SharedRoundtripInfo = Arc<Mutex<RoundtripInfo>>;

/// Create a scratch record and attach it to the request.
pub fn attach_roundtrip_info(req: &mut axum::http::Request<Bytes>) -> SharedRoundtripInfo {
    let info: SharedRoundtripInfo = Arc::default();
    req.extensions_mut().insert(info.clone());
    info
}

/// Record into the scratch record, ignoring a poisoned lock.
pub fn record<F>(info: &SharedRoundtripInfo, f: F)
where
    F: FnOnce(&mut RoundtripInfo),
{
    if let Ok(mut guard) = info.lock() {
        f(&mut guard);
    }
}
