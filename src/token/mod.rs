//! Shared bearer-token cache.
//!
//! Tokens acquired by the OAuth2 flow are cached process-wide, keyed by
//! token-endpoint identity. A resource request that answers 401 while
//! carrying a cache key deletes its token, forcing re-acquisition on the
//! next attempt.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct TokenEntry {
    token: String,
    expires_at: Instant,
}

/// Concurrent token store. Reads are lock-free for callers; writes go
/// through DashMap's shard locking.
#[derive(Debug, Default)]
pub struct TokenStore {
    entries: DashMap<String, TokenEntry>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a token. Expired entries are dropped on read.
    pub fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.token.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Cache a token for `ttl`.
    pub fn set(&self, key: impl Into<String>, token: impl Into<String>, ttl: Duration) {
        self.entries.insert(
            key.into(),
            TokenEntry {
                token: token.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Invalidate a token. Returns whether an entry was present.
    pub fn del(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
