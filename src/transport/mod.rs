//! Upstream transport subsystem.
//!
//! # Data Flow
//! ```text
//! request + backend config
//!     → key.rs (resolve effective transport identity)
//!     → pool.rs (cached client per identity)
//!     → backend.rs (timeouts, headers, compression, exchange)
//!     → buffered upstream response
//! ```

pub mod backend;
pub mod key;
pub mod pool;

pub use backend::Backend;
pub use key::{resolve, TransportKey};
pub use pool::TransportPool;
