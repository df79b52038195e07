//! Time-expiring response cache keyed by (language, type, slug).
//!
//! The cache holds the last materialized document for a key. It is never a
//! source of truth: writes refresh it, deletes invalidate it, and expired
//! entries simply miss. A background purge keeps memory bounded even when
//! nothing reads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::document::Fields;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub language: String,
    pub content_type: String,
    pub slug: String,
}

impl CacheKey {
    pub fn new(language: &str, content_type: &str, slug: &str) -> Self {
        Self {
            language: language.to_string(),
            content_type: content_type.to_string(),
            slug: slug.to_string(),
        }
    }
}

struct CacheEntry {
    fields: Fields,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// A cached document, unless absent or expired. Expired entries are left
    /// for the purge task rather than removed inline.
    pub fn get(&self, key: &CacheKey) -> Option<Fields> {
        if let Some(entry) = self.entries.get(key)
            && entry.expires_at > Instant::now()
        {
            counter!("scrigno_cache_hit_total").increment(1);
            return Some(entry.fields.clone());
        }
        counter!("scrigno_cache_miss_total").increment(1);
        None
    }

    /// Store with the default TTL, replacing any previous entry.
    pub fn set(&self, key: CacheKey, fields: Fields) {
        self.entries.insert(
            key,
            CacheEntry {
                fields,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove immediately, regardless of expiry.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before - self.entries.len();
        if purged > 0 {
            counter!("scrigno_cache_purged_total").increment(purged as u64);
        }
        purged
    }

    /// Spawn the periodic purge loop. The handle should be aborted on
    /// shutdown.
    pub fn spawn_purge(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // Skip the first immediate tick
            loop {
                tick.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(target: "scrigno::cache", purged, "purged expired cache entries");
                }
            }
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
