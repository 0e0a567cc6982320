//! Configuration schema definitions.
//!
//! This module defines the gateway's configuration structure. All types
//! derive Serde traits for deserialization from config files. Backend
//! `origin` and `hostname` values are raw strings that may be expressions;
//! they are resolved per request by the transport config resolver, not here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, health path).
    pub listener: ListenerConfig,

    /// Backend definitions, referenced by routes.
    pub backends: Vec<BackendConfig>,

    /// Route definitions mapping request paths to backends.
    pub routes: Vec<RouteConfig>,

    /// Named access-control definitions.
    pub access_controls: Vec<AccessControlConfig>,

    /// Control names applied to every route unless disabled per route.
    pub access_control: Vec<String>,

    /// CORS policy for cross-origin requests.
    pub cors: CorsConfig,

    /// Upstream transport defaults shared by all pooled clients.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Liveness probe path, answered without touching any backend.
    pub health_path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            health_path: "/healthz".to_string(),
        }
    }
}

/// Per-backend settings. Immutable once loaded; shared by all requests
/// routed to that backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Origin URL. May be a dynamic expression resolved per request.
    pub origin: String,

    /// Host header override. May be an expression; defaults to the
    /// resolved origin's authority.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Overall deadline for one exchange in seconds (0 = disabled).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds (0 = disabled).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Time-to-first-byte timeout in seconds (0 = disabled).
    #[serde(default = "default_ttfb_timeout_secs")]
    pub ttfb_timeout_secs: u64,

    /// Honor proxy-related environment variables for this backend.
    #[serde(default)]
    pub proxy_from_env: bool,

    /// Static credentials as "user:password"; sets the Authorization
    /// header on every outgoing request.
    #[serde(default)]
    pub basic_auth: Option<String>,

    /// Optional OpenAPI validation reference.
    #[serde(default)]
    pub openapi: Option<OpenApiConfig>,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_ttfb_timeout_secs() -> u64 {
    60
}

/// The backend's three independent timeout domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub total: Option<Duration>,
    pub connect: Option<Duration>,
    pub ttfb: Option<Duration>,
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl BackendConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            total: seconds(self.timeout_secs),
            connect: seconds(self.connect_timeout_secs),
            ttfb: seconds(self.ttfb_timeout_secs),
        }
    }
}

/// Reference to a named OpenAPI validator registered by the embedder.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenApiConfig {
    /// Name of the registered validator.
    pub validator: String,

    /// Log request violations instead of failing the exchange.
    #[serde(default)]
    pub ignore_request_violations: bool,

    /// Log response violations instead of failing the exchange.
    #[serde(default)]
    pub ignore_response_violations: bool,
}

/// Route configuration mapping a path prefix to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix to match; the longest prefix wins.
    pub path_prefix: String,

    /// Backend name to forward to.
    pub backend: String,

    /// Additional named controls applied to this route, in order.
    #[serde(default)]
    pub access_control: Vec<String>,

    /// Inherited control names disabled for this route.
    #[serde(default)]
    pub disable_access_control: Vec<String>,
}

/// A named access-control definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessControlConfig {
    /// Name routes use to reference this control.
    pub name: String,

    #[serde(flatten)]
    pub kind: AccessControlKind,
}

/// Concrete control behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessControlKind {
    /// Compare Basic credentials against a static pair.
    BasicAuth { user: String, password: String },

    /// Require a non-empty bearer token.
    TokenPresent,
}

/// CORS policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins, case-insensitive; "*" matches any origin.
    pub allowed_origins: Vec<String>,

    /// Set Access-Control-Allow-Credentials.
    pub allow_credentials: bool,

    /// Access-Control-Max-Age in seconds (0 = unset).
    pub max_age_secs: u64,

    /// Disable CORS handling entirely.
    pub disable: bool,
}

/// Upstream transport defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Idle connection timeout for pooled upstream connections in seconds.
    pub idle_timeout_secs: u64,

    /// Maximum buffered body size in bytes, both directions.
    pub max_body_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
