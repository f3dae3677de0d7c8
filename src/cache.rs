//! In-memory cache of resolved download links.
//!
//! Resolved URLs stay valid for a few minutes on the platform's CDN, so a
//! matching TTL lets repeat requests for the same document skip the whole
//! automation pipeline. Expiry is checked on every read; pruning is lazy.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default TTL for cached links (5 minutes), matching how long the signed
/// URLs are honored.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    url: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(url: String, ttl: Duration) -> Self {
        Self {
            url,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// document id -> resolved URL.
pub struct LinkCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached URL for a document, or None if missing/expired.
    pub fn get(&self, document_id: &str) -> Option<String> {
        self.entries.read().ok().and_then(|guard| {
            guard
                .get(document_id)
                .and_then(|entry| (!entry.is_expired()).then(|| entry.url.clone()))
        })
    }

    pub fn insert(&self, document_id: &str, url: &str) {
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(
                document_id.to_string(),
                CacheEntry::new(url.to_string(), self.ttl),
            );
            // Prune expired entries occasionally (when the map grows)
            if guard.len() > 100 {
                guard.retain(|_, entry| !entry.is_expired());
            }
        }
    }
}

impl Default for LinkCache {
    fn default() -> Self {
        Self::new()
    }
}
