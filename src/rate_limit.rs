//! Multi-scope token-bucket rate limiting and live-handle counters (C6).
//!
//! No crate in the dependency stack provides a token bucket, so this is
//! hand-rolled: a lazily-refilled counter guarded by its own mutex, with
//! per-scope state kept in `dashmap` maps so concurrent clients don't
//! contend on a single lock.

use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// A single lazily-refilled token bucket.
struct Bucket {
    rate_per_sec: f64,
    burst: f64,
    tokens: Mutex<(f64, Instant)>,
}

impl Bucket {
    fn new(rate_per_sec: f64, burst: f64) -> Self {
        Bucket { rate_per_sec, burst, tokens: Mutex::new((burst, Instant::now())) }
    }

    fn allow(&self) -> bool {
        let mut guard = self.tokens.lock().unwrap();
        let (tokens, last) = &mut *guard;
        let now = Instant::now();
        let elapsed = now.duration_since(*last).as_secs_f64();
        *tokens = (*tokens + elapsed * self.rate_per_sec).min(self.burst);
        *last = now;
        if *tokens >= 1.0 {
            *tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// True when the bucket is sitting at full burst, i.e. no recent
    /// activity — used by the periodic cleanup sweep.
    fn is_idle(&self) -> bool {
        let guard = self.tokens.lock().unwrap();
        guard.0 >= self.burst
    }
}

/// Rates and burst sizes for every scope (§4.6), sourced from the
/// exported-options snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub global_rate: f64,
    pub global_burst: f64,
    pub per_ip_rate: f64,
    pub per_ip_burst: f64,
    pub per_connection_rate: f64,
    pub per_connection_burst: f64,
    pub large_read_rate: f64,
    pub large_write_rate: f64,
    pub readdir_rate: f64,
    pub mount_rate: f64,
    pub large_threshold_bytes: u32,
    pub file_handles_per_ip: u64,
    pub file_handles_global: u64,
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            global_rate: 10_000.0,
            global_burst: 10_000.0,
            per_ip_rate: 1_000.0,
            per_ip_burst: 100.0,
            per_connection_rate: 100.0,
            per_connection_burst: 10.0,
            large_read_rate: 100.0,
            large_write_rate: 50.0,
            readdir_rate: 20.0,
            mount_rate: 10.0 / 60.0,
            large_threshold_bytes: 64 * 1024,
            file_handles_per_ip: 10_000,
            file_handles_global: 100_000,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// The class of operation being rate-checked, used to pick the
/// per-operation bucket in addition to the always-checked global/IP/conn
/// buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Normal,
    LargeRead,
    LargeWrite,
    ReadDir,
    Mount,
}

struct PerIpState {
    bucket: Bucket,
    large_read: Bucket,
    large_write: Bucket,
    readdir: Bucket,
    mount: Bucket,
    live_handles: AtomicI64,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    global: Bucket,
    per_ip: DashMap<IpAddr, PerIpState>,
    per_connection: DashMap<u64, Bucket>,
    global_handles: AtomicI64,
    rejections: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            global: Bucket::new(config.global_rate, config.global_burst),
            per_ip: DashMap::new(),
            per_connection: DashMap::new(),
            global_handles: AtomicI64::new(0),
            rejections: AtomicU64::new(0),
            config,
        }
    }

    fn ip_state(&self, ip: IpAddr) -> dashmap::mapref::one::RefMut<'_, IpAddr, PerIpState> {
        self.per_ip.entry(ip).or_insert_with(|| PerIpState {
            bucket: Bucket::new(self.config.per_ip_rate, self.config.per_ip_burst),
            large_read: Bucket::new(self.config.large_read_rate, self.config.large_read_rate),
            large_write: Bucket::new(self.config.large_write_rate, self.config.large_write_rate),
            readdir: Bucket::new(self.config.readdir_rate, self.config.readdir_rate),
            mount: Bucket::new(self.config.mount_rate, self.config.mount_rate),
            live_handles: AtomicI64::new(0),
        })
    }

    /// Checks buckets in order global -> per-IP -> per-connection ->
    /// per-operation, short-circuiting on the first denial.
    pub fn allow(&self, ip: IpAddr, connection_id: u64, class: OperationClass, size: u32) -> bool {
        if !self.global.allow() {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let ip_state = self.ip_state(ip);
        if !ip_state.bucket.allow() {
            drop(ip_state);
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let conn_bucket = self
            .per_connection
            .entry(connection_id)
            .or_insert_with(|| Bucket::new(self.config.per_connection_rate, self.config.per_connection_burst));
        if !conn_bucket.allow() {
            drop(conn_bucket);
            drop(ip_state);
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        drop(conn_bucket);

        let op_allowed = match class {
            OperationClass::Normal => true,
            OperationClass::LargeRead if size > self.config.large_threshold_bytes => ip_state.large_read.allow(),
            OperationClass::LargeWrite if size > self.config.large_threshold_bytes => ip_state.large_write.allow(),
            OperationClass::LargeRead | OperationClass::LargeWrite => true,
            OperationClass::ReadDir => ip_state.readdir.allow(),
            OperationClass::Mount => ip_state.mount.allow(),
        };
        if !op_allowed {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
        op_allowed
    }

    /// Reserves a handle slot for `ip`, enforcing both the per-IP and global
    /// live-handle ceilings. Returns `false` (and reserves nothing) if
    /// either would be exceeded.
    pub fn try_reserve_handle(&self, ip: IpAddr) -> bool {
        let ip_state = self.ip_state(ip);
        let ip_count = ip_state.live_handles.fetch_add(1, Ordering::Relaxed) + 1;
        if ip_count as u64 > self.config.file_handles_per_ip {
            ip_state.live_handles.fetch_sub(1, Ordering::Relaxed);
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let global_count = self.global_handles.fetch_add(1, Ordering::Relaxed) + 1;
        if global_count as u64 > self.config.file_handles_global {
            self.global_handles.fetch_sub(1, Ordering::Relaxed);
            ip_state.live_handles.fetch_sub(1, Ordering::Relaxed);
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn release_handle(&self, ip: IpAddr) {
        if let Some(state) = self.per_ip.get(&ip) {
            state.live_handles.fetch_sub(1, Ordering::Relaxed);
        }
        self.global_handles.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn rejection_count(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Drops per-IP/per-connection state whose bucket is idle (full burst,
    /// meaning no recent activity). Intended to run on `cleanup_interval`.
    pub fn cleanup(&self) {
        self.per_ip.retain(|_, state| !state.bucket.is_idle() || state.live_handles.load(Ordering::Relaxed) > 0);
        self.per_connection.retain(|_, bucket| !bucket.is_idle());
    }

    pub fn forget_connection(&self, connection_id: u64) {
        self.per_connection.remove(&connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn burst_is_exhausted_then_denies() {
        let config = RateLimitConfig {
            global_rate: 1000.0,
            global_burst: 1000.0,
            per_ip_rate: 0.0,
            per_ip_burst: 3.0,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(config);
        for _ in 0..3 {
            assert!(limiter.allow(ip(), 1, OperationClass::Normal, 0));
        }
        assert!(!limiter.allow(ip(), 1, OperationClass::Normal, 0));
    }

    #[test]
    fn handle_reservation_respects_per_ip_cap() {
        let config = RateLimitConfig { file_handles_per_ip: 1, ..RateLimitConfig::default() };
        let limiter = RateLimiter::new(config);
        assert!(limiter.try_reserve_handle(ip()));
        assert!(!limiter.try_reserve_handle(ip()));
        limiter.release_handle(ip());
        assert!(limiter.try_reserve_handle(ip()));
    }
}
