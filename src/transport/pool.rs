//! Transport cache: one pooled client per effective transport key.
//!
//! Rebuilding a connection pool per request would defeat keep-alive; the
//! cache maps each [`TransportKey`] to exactly one pooled client for the
//! process lifetime. Concurrent misses for the same key are resolved by
//! DashMap's entry locking, so only one pool is ever built per key.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use dashmap::DashMap;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::transport::key::TransportKey;

/// Pooled upstream clients keyed by effective transport configuration.
pub struct TransportPool {
    idle_timeout: Duration,
    clients: DashMap<TransportKey, Arc<Client<HttpConnector, Body>>>,
}

impl TransportPool {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            clients: DashMap::new(),
        }
    }

    /// Look up or build the client for `key`. The same key always yields a
    /// handle to the same client instance.
    pub fn get_or_create(&self, key: &TransportKey) -> Arc<Client<HttpConnector, Body>> {
        self.clients
            .entry(key.clone())
            .or_insert_with(|| Arc::new(self.build(key)))
            .value()
            .clone()
    }

    fn build(&self, key: &TransportKey) -> Client<HttpConnector, Body> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(key.connect_timeout);
        Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.idle_timeout)
            .build(connector)
    }

    /// Drop every cached client. Called on config reload by the embedding
    /// process; in-flight requests keep their cloned handles.
    pub fn clear(&self) {
        self.clients.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for TransportPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
