//! Request-scoped error kinds.
//!
//! Every error here is fatal to a single exchange and never to the process.
//! Transport failures (network, timeout) are kept distinguishable from
//! validation and evaluation failures so operators can tell connectivity
//! issues from logic issues.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::access_control::AccessControlError;
use crate::eval::EvalError;

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Which timeout domain fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDomain {
    /// Overall deadline for the whole exchange including body read.
    Total,
    /// Time until the first response byte (response head).
    FirstByte,
}

impl std::fmt::Display for TimeoutDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutDomain::Total => f.write_str("total"),
            TimeoutDomain::FirstByte => f.write_str("ttfb"),
        }
    }
}

/// Errors produced while gating, forwarding, or reshaping one exchange.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The backend's origin or hostname expression could not be evaluated
    /// or did not resolve to a usable URL.
    #[error("backend configuration: {0}")]
    ConfigEvaluation(String),

    /// The outgoing request violated the configured schema. No network
    /// call has been made.
    #[error("upstream request validation failed")]
    UpstreamRequestValidation,

    /// The upstream response violated the configured schema.
    #[error("upstream response validation failed")]
    UpstreamResponseValidation,

    /// Network-level failure (DNS, connect, reset). Never retried here.
    #[error("upstream transport: {0}")]
    Transport(String),

    /// A configured timeout fired before the exchange completed.
    #[error("upstream {domain} timeout after {limit:?}")]
    Timeout { domain: TimeoutDomain, limit: Duration },

    /// A named access control rejected the request before it reached
    /// the backend.
    #[error("access control {control:?} denied request: {source}")]
    AccessControlDenied {
        control: String,
        #[source]
        source: AccessControlError,
    },

    /// A configured request/response context expression failed to evaluate.
    #[error("context evaluation: {0}")]
    Evaluation(#[from] EvalError),
}

impl GatewayError {
    /// True for network-level failures including timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::Timeout { .. }
        )
    }

    /// Client-facing status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ConfigEvaluation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamRequestValidation
            | GatewayError::UpstreamResponseValidation
            | GatewayError::Transport(_)
            | GatewayError::Evaluation(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::AccessControlDenied { source, .. } => match source {
                AccessControlError::MissingCredentials => StatusCode::UNAUTHORIZED,
                _ => StatusCode::FORBIDDEN,
            },
        }
    }
}
