//! API gateway core: routed reverse proxying with access control, CORS
//! negotiation, upstream transport pooling, and OAuth2 token caching.

pub mod access_control;
pub mod config;
pub mod context;
pub mod cors;
pub mod error;
pub mod eval;
pub mod http;
pub mod observability;
pub mod proxy;
pub mod token;
pub mod transport;
pub mod validation;

pub use config::{load_config, GatewayConfig};
pub use error::{GatewayError, Result};
pub use http::GatewayServer;
