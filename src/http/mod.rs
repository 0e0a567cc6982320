//! HTTP frontend subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, buffering, request ID)
//!     → CORS preflight / access-control gate
//!     → proxy (relay to backend round-tripper)
//!     → CORS decoration, upstream log
//!     → Send to client
//! ```

pub mod server;

pub use server::GatewayServer;
