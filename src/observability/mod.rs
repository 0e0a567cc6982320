//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one line per exchange)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//! ```
//!
//! # Design Decisions
//! - Structured logging via the tracing crate
//! - Request ID flows through all subsystems
//! - Level configured at startup, overridable via RUST_LOG

pub mod logging;
