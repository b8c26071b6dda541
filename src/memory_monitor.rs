//! Periodic RSS sampling that shrinks caches under memory pressure (C8).
//!
//! `/proc/self/statm` is read directly; this is Linux-only, matching the
//! rest of the crate's platform-specific pieces (the `io-uring`/`libc`
//! dependencies are also gated on `cfg(target_os = "linux")`).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{AttrCache, ReadAheadPool};

#[derive(Debug, Clone, Copy)]
pub struct MemoryMonitorConfig {
    pub check_interval: Duration,
    pub high_watermark: f64,
    pub low_watermark: f64,
    pub total_memory_bytes: u64,
    pub floor_attr_entries: u64,
    pub floor_read_ahead_bytes: u64,
}

impl Default for MemoryMonitorConfig {
    fn default() -> Self {
        MemoryMonitorConfig {
            check_interval: Duration::from_secs(30),
            high_watermark: 0.8,
            low_watermark: 0.6,
            total_memory_bytes: total_system_memory().unwrap_or(1 << 34),
            floor_attr_entries: 500,
            floor_read_ahead_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Reads resident set size in bytes from `/proc/self/statm`.
#[cfg(target_os = "linux")]
pub fn resident_set_size() -> std::io::Result<u64> {
    let contents = std::fs::read_to_string("/proc/self/statm")?;
    let rss_pages: u64 = contents
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed statm"))?;
    let page_size = 4096u64;
    Ok(rss_pages * page_size)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_set_size() -> std::io::Result<u64> {
    Ok(0)
}

#[cfg(target_os = "linux")]
fn total_system_memory() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = contents.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[cfg(not(target_os = "linux"))]
fn total_system_memory() -> Option<u64> {
    None
}

/// Runs the periodic sampling loop until `shutdown` fires. Spawn with
/// `tokio::spawn`.
pub async fn run(
    config: MemoryMonitorConfig,
    attr_cache: Arc<AttrCache>,
    read_ahead: Arc<ReadAheadPool>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.check_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = shutdown.changed() => break,
        }
        let rss = match resident_set_size() {
            Ok(rss) => rss,
            Err(err) => {
                warn!(error = %err, "failed to sample resident set size");
                continue;
            }
        };
        let usage = rss as f64 / config.total_memory_bytes as f64;
        debug!(usage, rss, "memory monitor sample");
        if usage >= config.high_watermark {
            shrink(&config, usage, &attr_cache, &read_ahead);
        }
    }
}

fn shrink(config: &MemoryMonitorConfig, usage: f64, attr_cache: &AttrCache, read_ahead: &ReadAheadPool) {
    let factor = ((usage - config.low_watermark) / (1.0 - config.low_watermark)).clamp(0.0, 1.0);
    let attr_target = ((attr_cache.len() as f64) * (1.0 - factor)) as u64;
    let attr_target = attr_target.max(config.floor_attr_entries);
    attr_cache.resize(attr_target);

    let ra_target = ((read_ahead.memory_used() as f64) * (1.0 - factor)) as u64;
    let ra_target = ra_target.max(config.floor_read_ahead_bytes);
    read_ahead.shrink_to(ra_target);
    warn!(factor, attr_target, ra_target, "shrinking caches under memory pressure");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_reads_a_positive_value_on_linux() {
        if cfg!(target_os = "linux") {
            assert!(resident_set_size().unwrap() > 0);
        }
    }
}
