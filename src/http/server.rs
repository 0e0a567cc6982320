//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing)
//! - Compile routes: resolve backends, access-control chains, validators
//! - Gate requests (CORS preflight, access control) before forwarding
//! - Decorate every response with CORS headers
//! - Emit one structured upstream log line per exchange

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderValue, Request, Response, StatusCode},
    routing::any,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::access_control::{AccessControlChain, ControlMap};
use crate::config::loader::ConfigError;
use crate::config::schema::GatewayConfig;
use crate::context::{self, SharedRoundtripInfo};
use crate::cors::{self, CorsOptions};
use crate::eval::{ExpressionEvaluator, LiteralEvaluator};
use crate::observability::logging;
use crate::proxy::Proxy;
use crate::token::TokenStore;
use crate::transport::{Backend, TransportPool};
use crate::validation::{ValidationOptions, ValidatorRegistry};

const X_REQUEST_ID: &str = "x-request-id";

/// One configured route, ready to serve.
struct CompiledRoute {
    path_prefix: String,
    chain: AccessControlChain,
    proxy: Arc<Proxy>,
}

/// Application state injected into the handler.
#[derive(Clone)]
struct AppState {
    routes: Arc<Vec<CompiledRoute>>,
    cors: Option<Arc<CorsOptions>>,
    health_path: Arc<String>,
    max_body_bytes: usize,
}

/// HTTP server for the gateway.
#[derive(Debug)]
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a server with default collaborators: literal expressions,
    /// no schema validators.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let controls = ControlMap::from_config(&config.access_controls);
        Self::with_collaborators(
            config,
            controls,
            ValidatorRegistry::new(),
            Arc::new(LiteralEvaluator),
        )
    }

    /// Create a server with caller-supplied collaborators. Dangling
    /// validator or control references fail here, before any socket is
    /// bound.
    pub fn with_collaborators(
        config: GatewayConfig,
        controls: ControlMap,
        validators: ValidatorRegistry,
        expr: Arc<dyn ExpressionEvaluator>,
    ) -> Result<Self, ConfigError> {
        let pool = Arc::new(TransportPool::new(Duration::from_secs(
            config.transport.idle_timeout_secs,
        )));
        let tokens = Arc::new(TokenStore::new());
        let max_body_bytes = config.transport.max_body_bytes;

        let mut routes = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            let conf = config
                .backends
                .iter()
                .find(|b| b.name == route.backend)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownBackend(route.backend.clone()))?;

            let mut backend = Backend::new(Arc::new(conf.clone()), pool.clone(), tokens.clone())
                .with_expression_evaluator(expr.clone())
                .with_body_limit(max_body_bytes);
            if let Some(openapi) = &conf.openapi {
                let validator = validators.resolve(&openapi.validator)?;
                backend = backend.with_validator(
                    validator,
                    ValidationOptions {
                        ignore_request_violations: openapi.ignore_request_violations,
                        ignore_response_violations: openapi.ignore_response_violations,
                    },
                );
            }

            // Gateway-level controls first, then the route's own.
            let applied: Vec<String> = config
                .access_control
                .iter()
                .chain(&route.access_control)
                .cloned()
                .collect();
            let chain = controls.chain(&applied, &route.disable_access_control)?;

            routes.push(CompiledRoute {
                path_prefix: route.path_prefix.clone(),
                chain,
                proxy: Arc::new(Proxy::new(Arc::new(backend))),
            });
        }

        let state = AppState {
            routes: Arc::new(routes),
            cors: CorsOptions::from_config(&config.cors).map(Arc::new),
            health_path: Arc::new(config.listener.health_path.clone()),
            max_body_bytes,
        };

        let router = Self::build_router(state);
        Ok(Self { router, config })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "gateway listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("gateway stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Catch-all handler: gate, forward, decorate.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();

    if request.uri().path() == state.health_path.as_str() {
        return plain_response(StatusCode::OK, "ok");
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return plain_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
    };
    let mut req = Request::from_parts(parts, bytes);

    let info = context::attach_roundtrip_info(&mut req);
    ensure_request_id(&mut req);

    let resp = dispatch(&state, req).await;

    logging::log_roundtrip(&info, resp.status(), start.elapsed());

    let (parts, bytes) = resp.into_parts();
    Response::from_parts(parts, Body::from(bytes))
}

/// Route, gate, and forward one buffered request. Every return path goes
/// through CORS decoration.
async fn dispatch(state: &AppState, req: Request<Bytes>) -> Response<Bytes> {
    let method = req.method().clone();
    let req_headers = req.headers().clone();

    // Preflights are answered here; the backend never sees them.
    if let Some(cors) = &state.cors {
        if cors::is_preflight(req.method(), req.headers()) {
            return cors::preflight_response(cors, &req);
        }
    }

    let mut resp = match match_route(&state.routes, req.uri().path()) {
        None => plain_bytes_response(StatusCode::NOT_FOUND, "no matching route"),
        Some(route) => match route.chain.validate(&req) {
            Err(err) => {
                tracing::debug!(error = %err, "request denied");
                error_response(&err, req.extensions().get::<SharedRoundtripInfo>())
            }
            Ok(()) => match route.proxy.forward(req).await {
                Ok(resp) => resp,
                Err(err) => {
                    tracing::warn!(backend = route.proxy.backend_name(), error = %err, "upstream exchange failed");
                    error_response(&err, None)
                }
            },
        },
    };

    if let Some(cors) = &state.cors {
        cors::apply_response_headers(cors, &method, &req_headers, resp.headers_mut());
    }
    resp
}

/// Longest-prefix route match.
fn match_route<'a>(routes: &'a [CompiledRoute], path: &str) -> Option<&'a CompiledRoute> {
    routes
        .iter()
        .filter(|route| path.starts_with(route.path_prefix.as_str()))
        .max_by_key(|route| route.path_prefix.len())
}

fn ensure_request_id(req: &mut Request<Bytes>) {
    if !req.headers().contains_key(X_REQUEST_ID) {
        let id = Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&id) {
            req.headers_mut().insert(X_REQUEST_ID, value);
        }
    }
}

fn error_response(
    err: &crate::error::GatewayError,
    info: Option<&SharedRoundtripInfo>,
) -> Response<Bytes> {
    if let Some(info) = info {
        let message = err.to_string();
        context::record(info, |i| i.transport_error = Some(message));
    }
    plain_bytes_response(err.status(), "")
}

fn plain_bytes_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut resp = Response::new(Bytes::from_static(body.as_bytes()));
    *resp.status_mut() = status;
    resp
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
