//! Exported-options controller (C12): a runtime-mutable policy snapshot
//! behind an atomic pointer, per the "global export-policy snapshot"
//! redesign strategy.

use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Squash mode applied to the auth context before any permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquashMode {
    None,
    Root,
    All,
}

/// An allowed client, expressed as a single address or a CIDR block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRule {
    pub network: IpAddr,
    pub prefix_len: u8,
}

impl ClientRule {
    pub fn matches(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(peer)) => {
                let mask = if self.prefix_len == 0 { 0 } else { u32::MAX << (32 - self.prefix_len.min(32)) };
                (u32::from(net) & mask) == (u32::from(peer) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(peer)) => {
                let mask = if self.prefix_len == 0 { 0 } else { u128::MAX << (128 - self.prefix_len.min(128)) };
                (u128::from(net) & mask) == (u128::from(peer) & mask)
            }
            _ => false,
        }
    }
}

/// The immutable, process-wide configuration snapshot (§3.1 "Export
/// policy"). Replacing it is atomic; a request observes one consistent
/// snapshot for its whole lifetime.
#[derive(Debug, Clone)]
pub struct ExportPolicy {
    pub read_only: bool,
    pub async_write: bool,
    pub allowed_clients: Vec<ClientRule>,
    pub squash: SquashMode,
    pub attr_cache_size: u64,
    pub attr_cache_ttl: Duration,
    pub negative_cache_enabled: bool,
    pub negative_cache_ttl: Duration,
    pub read_ahead_enabled: bool,
    pub read_ahead_size: u32,
    pub read_ahead_max_files: usize,
    pub read_ahead_max_memory: u64,
    pub transfer_size: u32,
    pub idle_timeout: Duration,
    pub max_connections: usize,
    pub worker_count: usize,
    pub batch_enabled: bool,
    pub max_batch_size: usize,
    pub bound_port: u16,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        ExportPolicy {
            read_only: false,
            async_write: false,
            allowed_clients: Vec::new(),
            squash: SquashMode::Root,
            attr_cache_size: 10_000,
            attr_cache_ttl: Duration::from_secs(5),
            negative_cache_enabled: true,
            negative_cache_ttl: Duration::from_secs(2),
            read_ahead_enabled: true,
            read_ahead_size: 128 * 1024,
            read_ahead_max_files: 256,
            read_ahead_max_memory: 64 * 1024 * 1024,
            transfer_size: 1 << 20,
            idle_timeout: Duration::from_secs(5 * 60),
            max_connections: 1024,
            worker_count: 0, // 0 means "derive from core count"
            batch_enabled: true,
            max_batch_size: 32,
            bound_port: 2049,
        }
    }
}

impl ExportPolicy {
    /// Returns `true` when `addr` may connect at all. An empty allow-list
    /// means "allow everyone" (the conventional default export).
    pub fn allows_client(&self, addr: IpAddr) -> bool {
        self.allowed_clients.is_empty() || self.allowed_clients.iter().any(|rule| rule.matches(addr))
    }
}

/// Error returned when an update attempts to change an immutable field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}` is immutable and cannot be changed by a runtime update")]
pub struct ImmutableFieldError {
    pub field: &'static str,
}

/// Holds the live snapshot and validates/applies updates.
pub struct ExportController {
    current: RwLock<Arc<ExportPolicy>>,
}

impl ExportController {
    pub fn new(initial: ExportPolicy) -> Self {
        ExportController { current: RwLock::new(Arc::new(initial)) }
    }

    /// Returns the current snapshot. Cheap: an `Arc` clone.
    pub fn get(&self) -> Arc<ExportPolicy> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Validates `new` against the current snapshot's immutable fields,
    /// then installs it atomically.
    pub fn update(&self, new: ExportPolicy) -> Result<(), ImmutableFieldError> {
        let current = self.get();
        if new.squash != current.squash {
            return Err(ImmutableFieldError { field: "squash" });
        }
        if new.bound_port != current.bound_port {
            return Err(ImmutableFieldError { field: "bound_port" });
        }
        *self.current.write().unwrap() = Arc::new(new);
        Ok(())
    }
}
