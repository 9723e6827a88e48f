//! In-memory render cache storage.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::clock::Clock;
use crate::application::syndication::RenderedFeed;

use super::config::CacheConfig;
use super::lock::lock_recovering;

const METRIC_RENDER_CACHE_EVICT: &str = "eksirss_render_cache_evict_total";

/// A rendered feed as served to readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFeed {
    pub body: Bytes,
    pub content_type: &'static str,
    pub last_modified: OffsetDateTime,
    pub expires: OffsetDateTime,
}

/// TTL + LRU cache of rendered feeds keyed by topic keyword.
pub struct RenderCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<LruCache<String, CachedFeed>>,
}

impl RenderCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let entries = Mutex::new(LruCache::new(config.capacity_non_zero()));
        Self {
            config,
            clock,
            entries,
        }
    }

    /// TTL applied by callers that do not pick their own.
    pub fn default_ttl(&self) -> Duration {
        self.config.render_ttl
    }

    /// Return the live entry for `keyword`, dropping it if it has expired.
    pub fn get(&self, keyword: &str) -> Option<CachedFeed> {
        let now = self.clock.now();
        let mut entries = lock_recovering(&self.entries, "get");

        let expired = match entries.get(keyword) {
            Some(entry) if entry.expires > now => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(keyword);
            debug!(keyword, "render cache entry expired");
        }
        None
    }

    /// Store a rendered feed for `ttl` and return the entry as it will be served.
    pub fn set(&self, keyword: &str, rendered: RenderedFeed, ttl: Duration) -> CachedFeed {
        let entry = CachedFeed {
            body: rendered.body,
            content_type: rendered.content_type,
            last_modified: rendered.last_modified,
            expires: self.clock.now() + ttl,
        };

        let evicted = lock_recovering(&self.entries, "set").push(keyword.to_string(), entry.clone());
        if let Some((evicted_key, _)) = evicted
            && evicted_key != keyword
        {
            counter!(METRIC_RENDER_CACHE_EVICT).increment(1);
            debug!(keyword = %evicted_key, "render cache evicted least recently used entry");
        }

        entry
    }

    /// Drop the entry for `keyword`. Returns whether one was present.
    pub fn invalidate(&self, keyword: &str) -> bool {
        lock_recovering(&self.entries, "invalidate")
            .pop(keyword)
            .is_some()
    }

    pub fn invalidate_all(&self) {
        lock_recovering(&self.entries, "invalidate_all").clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        lock_recovering(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
