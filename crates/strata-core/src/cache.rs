//! Process-local TTL caches for directory listings and search results.
//!
//! Both caches are lock-free (`DashMap`) with lazy expiry: entries past
//! their TTL are treated as absent on lookup and removed then. Correctness
//! under multi-process deployments relies on short TTLs, not coherence.
//! Cache failures never propagate; callers degrade to direct provider calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use crate::path;
use crate::principal::Principal;
use crate::types::{DirectoryListing, SearchHit, SearchScope};

/// Default TTL for search cache entries.
pub const SEARCH_CACHE_TTL: Duration = Duration::from_secs(300);

/// A cached value with its expiry instant.
#[derive(Debug, Clone)]
struct Expiring<V> {
    value: V,
    expires: Instant,
}

impl<V> Expiring<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self { value, expires: Instant::now() + ttl }
    }

    #[inline]
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }
}

/// Hit/miss counters shared by both caches.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    /// Total lookups that found a live entry.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total lookups that found nothing (or an expired entry).
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Per-mount TTL cache of directory listings.
///
/// Keys are `(mount_id, sub_path)` with the sub-path in directory form.
/// Mutations call [`invalidate_path_and_ancestors`](Self::invalidate_path_and_ancestors)
/// on the containing directory after they succeed, so a read issued by the
/// same caller immediately after a successful mutation never sees the stale
/// listing.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    entries: DashMap<(String, String), Expiring<DirectoryListing>>,
    counters: CacheCounters,
}

impl DirectoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live listing, removing it lazily if expired.
    pub fn get(&self, mount_id: &str, sub_path: &str) -> Option<DirectoryListing> {
        let key = (mount_id.to_string(), dir_key(sub_path));
        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired() {
                self.counters.record(true);
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(&key);
        }
        self.counters.record(false);
        None
    }

    /// Store a listing with the mount's TTL. A zero TTL is a no-op.
    pub fn set(&self, mount_id: &str, sub_path: &str, listing: DirectoryListing, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let key = (mount_id.to_string(), dir_key(sub_path));
        self.entries.insert(key, Expiring::new(listing, ttl));
    }

    /// Drop one entry. Returns true if it was present.
    pub fn invalidate(&self, mount_id: &str, sub_path: &str) -> bool {
        let key = (mount_id.to_string(), dir_key(sub_path));
        self.entries.remove(&key).is_some()
    }

    /// Drop the entry for `sub_path` and every ancestor up to `/`.
    ///
    /// A directory reference (trailing slash) invalidates itself and its
    /// chain; a file reference starts at its containing directory. Returns
    /// the number of entries actually removed.
    pub fn invalidate_path_and_ancestors(&self, mount_id: &str, sub_path: &str) -> usize {
        let mut removed = 0;
        for dir in path::ancestors(sub_path) {
            if self.invalidate(mount_id, &dir) {
                removed += 1;
            }
        }
        trace!(mount_id, sub_path, removed, "invalidated ancestor chain");
        removed
    }

    /// Drop every entry for one mount.
    pub fn invalidate_mount(&self, mount_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.0 != mount_id);
        before.saturating_sub(self.entries.len())
    }

    /// Live + expired entry count (expired entries are removed lazily).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters.
    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }
}

/// Normalize a sub-path to directory form for use as a cache key.
fn dir_key(sub_path: &str) -> String {
    if sub_path.ends_with('/') {
        sub_path.to_string()
    } else {
        format!("{sub_path}/")
    }
}

/// Key of one search cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SearchKey {
    query: String,
    scope: SearchScope,
    scope_target: String,
    principal: String,
}

/// Short-TTL cache of merged, scored search results (pre-pagination).
///
/// Empty result sets are not cached, so a search repeated right after an
/// upload sees the new file.
#[derive(Debug)]
pub struct SearchCache {
    entries: DashMap<SearchKey, Expiring<Vec<SearchHit>>>,
    ttl: Duration,
    counters: CacheCounters,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(SEARCH_CACHE_TTL)
    }
}

impl SearchCache {
    /// Cache with a custom TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    /// Fetch a live result set.
    pub fn get(
        &self,
        query: &str,
        scope: SearchScope,
        scope_target: Option<&str>,
        principal: &Principal,
    ) -> Option<Vec<SearchHit>> {
        let key = Self::key(query, scope, scope_target, principal);
        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired() {
                self.counters.record(true);
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(&key);
        }
        self.counters.record(false);
        None
    }

    /// Store a result set. Empty sets are bypassed.
    pub fn set(
        &self,
        query: &str,
        scope: SearchScope,
        scope_target: Option<&str>,
        principal: &Principal,
        hits: Vec<SearchHit>,
    ) {
        if hits.is_empty() {
            return;
        }
        let key = Self::key(query, scope, scope_target, principal);
        self.entries.insert(key, Expiring::new(hits, self.ttl));
    }

    /// Drop everything. Used when mounts or configs change shape.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Hit/miss counters.
    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    fn key(
        query: &str,
        scope: SearchScope,
        scope_target: Option<&str>,
        principal: &Principal,
    ) -> SearchKey {
        SearchKey {
            query: query.to_lowercase(),
            scope,
            scope_target: scope_target.unwrap_or_default().to_string(),
            principal: principal.identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(path: &str) -> DirectoryListing {
        DirectoryListing {
            path: path.to_string(),
            is_virtual: false,
            is_root: false,
            mount_id: Some("m1".into()),
            storage_type: None,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_get_set_roundtrip() {
        let cache = DirectoryCache::new();
        cache.set("m1", "/a/", listing("/docs/a/"), Duration::from_secs(60));
        assert!(cache.get("m1", "/a/").is_some());
        assert!(cache.get("m2", "/a/").is_none());
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = DirectoryCache::new();
        cache.set("m1", "/a/", listing("/docs/a/"), Duration::ZERO);
        assert!(cache.get("m1", "/a/").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lazy_expiry() {
        let cache = DirectoryCache::new();
        cache.set("m1", "/a/", listing("/docs/a/"), Duration::from_millis(10));
        assert!(cache.get("m1", "/a/").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("m1", "/a/").is_none());
        // The expired entry was removed on lookup.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_file_and_dir_keys_coincide() {
        let cache = DirectoryCache::new();
        cache.set("m1", "/a", listing("/docs/a/"), Duration::from_secs(60));
        assert!(cache.get("m1", "/a/").is_some());
    }

    #[test]
    fn test_invalidate_path_and_ancestors() {
        let cache = DirectoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("m1", "/", listing("/"), ttl);
        cache.set("m1", "/a/", listing("/a/"), ttl);
        cache.set("m1", "/a/b/", listing("/a/b/"), ttl);
        cache.set("m1", "/other/", listing("/other/"), ttl);

        let removed = cache.invalidate_path_and_ancestors("m1", "/a/b/");
        assert_eq!(removed, 3);
        assert!(cache.get("m1", "/a/b/").is_none());
        assert!(cache.get("m1", "/a/").is_none());
        assert!(cache.get("m1", "/").is_none());
        assert!(cache.get("m1", "/other/").is_some());
    }

    #[test]
    fn test_ancestor_invalidation_from_file_path() {
        let cache = DirectoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("m1", "/a/", listing("/a/"), ttl);
        cache.set("m1", "/", listing("/"), ttl);

        // A file path invalidates its containing directory upward.
        let removed = cache.invalidate_path_and_ancestors("m1", "/a/x.txt");
        assert_eq!(removed, 2);
    }

    #[test]
    fn test_invalidate_mount() {
        let cache = DirectoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("m1", "/a/", listing("/a/"), ttl);
        cache.set("m1", "/b/", listing("/b/"), ttl);
        cache.set("m2", "/a/", listing("/a/"), ttl);

        assert_eq!(cache.invalidate_mount("m1"), 2);
        assert!(cache.get("m2", "/a/").is_some());
    }

    #[test]
    fn test_counters() {
        let cache = DirectoryCache::new();
        cache.set("m1", "/a/", listing("/a/"), Duration::from_secs(60));
        cache.get("m1", "/a/");
        cache.get("m1", "/missing/");
        assert_eq!(cache.counters().hits(), 1);
        assert_eq!(cache.counters().misses(), 1);
    }

    fn hit(name: &str) -> SearchHit {
        SearchHit {
            name: name.to_string(),
            path: format!("/docs/{name}"),
            size: Some(1),
            modified: None,
            mount_id: "m1".into(),
        }
    }

    #[test]
    fn test_search_cache_roundtrip() {
        let cache = SearchCache::default();
        let p = Principal::admin("1");
        cache.set("report", SearchScope::Global, None, &p, vec![hit("report.pdf")]);
        let cached = cache.get("report", SearchScope::Global, None, &p).unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn test_search_cache_keyed_by_principal() {
        let cache = SearchCache::default();
        let a = Principal::admin("1");
        let b = Principal::admin("2");
        cache.set("q", SearchScope::Global, None, &a, vec![hit("x")]);
        assert!(cache.get("q", SearchScope::Global, None, &b).is_none());
    }

    #[test]
    fn test_search_cache_bypasses_empty() {
        let cache = SearchCache::default();
        let p = Principal::admin("1");
        cache.set("q", SearchScope::Global, None, &p, Vec::new());
        assert!(cache.get("q", SearchScope::Global, None, &p).is_none());
    }

    #[test]
    fn test_search_cache_query_case_insensitive_key() {
        let cache = SearchCache::default();
        let p = Principal::admin("1");
        cache.set("Report", SearchScope::Global, None, &p, vec![hit("report.pdf")]);
        assert!(cache.get("report", SearchScope::Global, None, &p).is_some());
    }
}
