//! Reverse-proxy adapter over the backend round-tripper.
//!
//! Relays an already-routed client request upstream. The adapter owns the
//! hop-by-hop header handling for relayed traffic, in both directions, and
//! marks the request accordingly so the round-tripper does not process the
//! same headers a second time.

use std::sync::Arc;

use axum::http::{Request, Response};
use bytes::Bytes;

use crate::context::{self, ProxyRelayed, SharedRoundtripInfo};
use crate::error::GatewayError;
use crate::eval::ContextEvaluator;
use crate::transport::backend::{remove_connection_headers, remove_hop_headers};
use crate::transport::Backend;

pub struct Proxy {
    backend: Arc<Backend>,
    evaluator: Option<Arc<dyn ContextEvaluator>>,
}

impl Proxy {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            evaluator: None,
        }
    }

    /// Plug in proxy-level request/response expressions. These run outside
    /// the backend's own context pass.
    pub fn with_context_evaluator(mut self, evaluator: Arc<dyn ContextEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Relay one client request upstream and return the buffered response.
    /// Transport failures are recorded into the request's roundtrip record
    /// before they propagate.
    pub async fn forward(&self, mut req: Request<Bytes>) -> Result<Response<Bytes>, GatewayError> {
        let info = req.extensions().get::<SharedRoundtripInfo>().cloned();

        if let Some(evaluator) = &self.evaluator {
            evaluator.evaluate_request(&mut req).await?;
        }

        // Hop-by-hop headers are connection-scoped; strip them here so the
        // round-tripper can skip its own pass for relayed requests.
        remove_connection_headers(req.headers_mut());
        remove_hop_headers(req.headers_mut());
        req.extensions_mut().insert(ProxyRelayed);

        match self.backend.round_trip(req).await {
            Ok(mut resp) => {
                remove_connection_headers(resp.headers_mut());
                remove_hop_headers(resp.headers_mut());
                if let Some(evaluator) = &self.evaluator {
                    evaluator.evaluate_response(&mut resp).await?;
                }
                Ok(resp)
            }
            Err(err) => {
                if let Some(ref info) = info {
                    let message = err.to_string();
                    context::record(info, |i| i.transport_error = Some(message));
                }
                Err(err)
            }
        }
    }
}
