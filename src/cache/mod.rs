//! Attribute cache (C4) and read-ahead buffer pool (C5).

pub mod attr;
pub mod read_ahead;

pub use attr::{AttrCache, AttrCacheConfig};
pub use read_ahead::{ReadAheadConfig, ReadAheadPool};

/// Outcome of a cache lookup that distinguishes a cached miss (tombstone)
/// from an absent entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Hit(T),
    NegativeHit,
    Miss,
}

/// Point-in-time counters exported by a cache (RFC-free, internal metrics).
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub negative_hits: u64,
    pub evictions: u64,
}
