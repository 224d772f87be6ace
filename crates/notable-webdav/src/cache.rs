//! Directory listing cache
//!
//! One entry per remote directory, each with its own fetch time and TTL.
//! Backed by a `DashMap` so concurrent readers and writers never contend on
//! a single lock. Writes and deletes through the store invalidate the
//! affected directory; everything else expires after the TTL.
//!
//! Each directory also carries a generation that `invalidate` bumps. A
//! caller that fetched a listing stores it with [`ListingCache::put_if_current`]
//! so a fetch that raced an invalidation cannot reinstate the older view.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::trace;

use notable_core::ports::WebDavFileInfo;

/// Default freshness window for a listing
pub const DEFAULT_LISTING_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct CachedListing {
    files: Vec<WebDavFileInfo>,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedListing {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < self.ttl
    }
}

#[derive(Debug)]
pub struct ListingCache {
    entries: DashMap<String, CachedListing>,
    generations: DashMap<String, u64>,
    ttl: Duration,
}

impl ListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, dir: &str) -> Option<Vec<WebDavFileInfo>> {
        self.get_at(dir, Utc::now())
    }

    /// Cached listing for `dir` if it is younger than the TTL at `now`
    ///
    /// A stale entry is removed.
    pub fn get_at(&self, dir: &str, now: DateTime<Utc>) -> Option<Vec<WebDavFileInfo>> {
        let key = normalize(dir);
        let fresh = self.entries.get(&key).and_then(|entry| {
            if entry.is_fresh(now) {
                Some(entry.files.clone())
            } else {
                None
            }
        });
        match fresh {
            Some(files) => {
                trace!(dir = %key, "listing cache hit");
                Some(files)
            }
            None => {
                // A listing put since the read above is fresh and stays.
                self.entries.remove_if(&key, |_, cached| !cached.is_fresh(now));
                None
            }
        }
    }

    pub fn put(&self, dir: &str, files: Vec<WebDavFileInfo>) {
        self.put_at(dir, files, Utc::now());
    }

    pub fn put_at(&self, dir: &str, files: Vec<WebDavFileInfo>, now: DateTime<Utc>) {
        self.entries.insert(
            normalize(dir),
            CachedListing {
                files,
                fetched_at: now,
                ttl: self.ttl,
            },
        );
    }

    /// Current generation of `dir`; capture it before fetching a listing
    pub fn generation(&self, dir: &str) -> u64 {
        self.generations
            .get(&normalize(dir))
            .map(|g| *g)
            .unwrap_or_default()
    }

    /// Store a listing fetched at `generation` unless `dir` was invalidated since
    ///
    /// Returns whether the listing was stored.
    pub fn put_if_current(&self, dir: &str, files: Vec<WebDavFileInfo>, generation: u64) -> bool {
        self.put_if_current_at(dir, files, generation, Utc::now())
    }

    pub fn put_if_current_at(
        &self,
        dir: &str,
        files: Vec<WebDavFileInfo>,
        generation: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let key = normalize(dir);
        // Held across the insert so an invalidation cannot slip in between.
        let current = self.generations.entry(key.clone()).or_insert(0);
        if *current != generation {
            trace!(dir = %key, "stale listing discarded");
            return false;
        }
        self.entries.insert(
            key,
            CachedListing {
                files,
                fetched_at: now,
                ttl: self.ttl,
            },
        );
        true
    }

    pub fn invalidate(&self, dir: &str) {
        let key = normalize(dir);
        let mut generation = self.generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        self.entries.remove(&key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_LISTING_TTL_SECS))
    }
}

/// `pages/`, `/pages` and `pages` share one entry
fn normalize(dir: &str) -> String {
    dir.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn file(name: &str) -> WebDavFileInfo {
        WebDavFileInfo {
            name: name.to_string(),
            path: format!("pages/{name}"),
            size: 1,
            last_modified: None,
            etag: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn listing_is_reused_inside_ttl_and_refetched_after() {
        let cache = ListingCache::default();
        cache.put_at("pages", vec![file("a_b_1.json")], t0());

        // Reused at four minutes even though the remote may have changed.
        let hit = cache.get_at("pages", t0() + Duration::minutes(4)).unwrap();
        assert_eq!(hit, vec![file("a_b_1.json")]);

        // Gone at six minutes, forcing a fresh fetch.
        assert!(cache.get_at("pages", t0() + Duration::minutes(6)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_drops_only_that_directory() {
        let cache = ListingCache::default();
        cache.put_at("pages/", vec![file("x")], t0());
        cache.put_at("notebooks", vec![], t0());

        cache.invalidate("/pages");
        assert!(cache.get_at("pages", t0()).is_none());
        assert!(cache.get_at("notebooks", t0()).is_some());

        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn listing_fetched_before_invalidation_is_discarded() {
        let cache = ListingCache::default();
        let before = cache.generation("pages");

        // An upload lands while the listing request is in flight.
        cache.invalidate("pages/");

        assert!(!cache.put_if_current_at("pages", vec![file("stale")], before, t0()));
        assert!(cache.get_at("pages", t0()).is_none());

        let after = cache.generation("/pages");
        assert_eq!(after, before + 1);
        assert!(cache.put_if_current_at("pages", vec![file("fresh")], after, t0()));
        assert_eq!(cache.get_at("pages", t0()).unwrap(), vec![file("fresh")]);
    }
}
