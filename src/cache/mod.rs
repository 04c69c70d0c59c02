//! Time-boxed cache for GET responses.
//!
//! The cache is a plain store: whether it is consulted at all is decided by
//! the client. Entries expire lazily on read; `purge_expired` reclaims
//! memory for entries nobody asks for again.

use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Query parameter carrying the act-as identity.
pub(crate) const AS_USER_PARAM: &str = "as_user_id";

/// Deterministic cache key for a request target and effective identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `target` (path or absolute URL) requested on
    /// behalf of `as_user_id`.
    ///
    /// The target is normalized first: query pairs are sorted and an
    /// `as_user_id` pair in the URL is folded into the identity.
    pub fn new(target: &str, as_user_id: Option<u64>) -> Self {
        let (normalized, embedded) = normalize_target(target);
        let identity = as_user_id.map(|id| id.to_string()).or(embedded);

        let mut hasher = Sha256::new();
        hasher.update(b"GET ");
        hasher.update(normalized.as_bytes());
        if let Some(identity) = identity {
            hasher.update(b"\nas_user:");
            hasher.update(identity.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-derived key.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Gets the key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_target(target: &str) -> (String, Option<String>) {
    let trimmed = target.trim();
    let Ok(mut url) = url::Url::parse(trimmed) else {
        return (trimmed.trim_matches('/').to_string(), None);
    };

    let mut identity = None;
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (k, v) in url.query_pairs() {
        if k == AS_USER_PARAM {
            identity = Some(v.into_owned());
        } else {
            pairs.push((k.into_owned(), v.into_owned()));
        }
    }
    pairs.sort();

    url.set_fragment(None);
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }

    let mut normalized = url.to_string();
    if url.query().is_none() {
        while normalized.ends_with('/') {
            normalized.pop();
        }
    }
    (normalized, identity)
}

/// A cached response body plus the pagination cursor it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Raw JSON body.
    pub body: Bytes,
    /// `rel="next"` link of the original response.
    pub next_link: Option<String>,
}

impl CachedResponse {
    /// Creates a cached response.
    pub fn new(body: impl Into<Bytes>, next_link: Option<String>) -> Self {
        Self {
            body: body.into(),
            next_link,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedResponse,
    expires_at: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet purged.
    pub entry_count: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Lookups that found an expired entry.
    pub expired: u64,
}

/// Key/value store for GET responses with per-entry expiry.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl ResponseCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an unexpired entry.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores an entry that expires `ttl` from now.
    pub fn set(&self, key: CacheKey, value: CachedResponse, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.lock().insert(key, CacheEntry { value, expires_at });
    }

    /// Removes one entry. Returns true if it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Gets cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
