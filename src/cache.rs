//! Clone-URL cache.
//!
//! Repository clone URLs are looked up once per (host, project, repository)
//! and kept for the lifetime of the process. Entries are never invalidated:
//! a repository's SSH clone URL is assumed not to change while we run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Cache key identifying one repository on one server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloneUrlKey {
    pub host: String,
    pub project: String,
    pub repository: String,
}

impl CloneUrlKey {
    pub fn new(
        host: impl Into<String>,
        project: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            project: project.into(),
            repository: repository.into(),
        }
    }
}

impl std::fmt::Display for CloneUrlKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.project, self.repository)
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Shared clone-URL memo. Reads take a shared lock, inserts an exclusive one.
#[derive(Debug, Default)]
pub struct CloneUrlCache {
    entries: RwLock<HashMap<CloneUrlKey, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CloneUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CloneUrlKey) -> Option<String> {
        self.entries
            .read()
            .expect("clone url cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Stores a URL. An existing entry for the key is kept.
    pub fn insert(&self, key: CloneUrlKey, url: String) {
        self.entries
            .write()
            .expect("clone url cache lock poisoned")
            .entry(key)
            .or_insert(url);
    }

    /// Returns the cached URL for `key`, calling `fetch` on a miss and
    /// storing its successful result. Failed lookups are not cached.
    ///
    /// Two workers missing the same key at the same instant may both
    /// fetch; the first stored value wins.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: CloneUrlKey, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(url) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "clone url cache hit");
            return Ok(url);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "clone url cache miss");

        let url = fetch().await?;
        self.insert(key.clone(), url);

        // re-read so racing fetchers agree on one value
        Ok(self.get(&key).unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("clone url cache lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
