//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Emit one upstream log event per completed exchange
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Log level configurable via config, overridable via RUST_LOG

use std::time::Duration;

use axum::http::StatusCode;

use crate::context::SharedRoundtripInfo;

/// Initialize the global subscriber. `level` is the fallback directive when
/// RUST_LOG is unset.
pub fn init(level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Emit the upstream log line for one exchange. Reads whatever the
/// round-tripper managed to record before completing or failing.
pub fn log_roundtrip(info: &SharedRoundtripInfo, status: StatusCode, elapsed: Duration) {
    let Ok(info) = info.lock() else {
        return;
    };

    tracing::info!(
        backend = %info.backend,
        method = info.method.as_ref().map(|m| m.as_str()).unwrap_or("-"),
        uri = %info.uri.as_ref().map(|u| u.to_string()).unwrap_or_else(|| "-".into()),
        upstream_status = info.status.map(|s| s.as_u16()).unwrap_or(0),
        status = status.as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        transport_error = info.transport_error.as_deref().unwrap_or(""),
        validation_errors = info.validation_errors.len(),
        "upstream exchange"
    );
}
