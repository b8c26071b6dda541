//! Top-level server wiring (C9/C12): owns every long-lived singleton,
//! accepts connections on the NFS and MOUNT ports, and drives orderly
//! shutdown.
//!
//! MOUNT and NFS share one RPC port by default — both programs are
//! dispatched out of the same accepted connection in [`connection::handle`]
//! — but a distinct `--mount-port` still gets its own listener bound to the
//! same [`Shared`] state, mirroring how real `mountd`/`nfsd` pairs are often
//! split onto separate sockets while sharing the export table.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::{AttrCache, AttrCacheConfig, ReadAheadConfig, ReadAheadPool};
use crate::connection::{self, Shared};
use crate::dispatch::{self, ServerState};
use crate::export::{ExportController, ExportPolicy};
use crate::handle_table::HandleTable;
use crate::logger::LogPolicy;
use crate::memory_monitor::{self, MemoryMonitorConfig};
use crate::metrics::Metrics;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::vfs::Vfs;
use crate::worker::{WorkerConfig, WorkerPool};

/// A running server's shutdown handle. Dropping it does not itself stop
/// the server; call [`Server::shutdown`] to signal every background task.
pub struct Server {
    shared: Shared,
    attr_cache: Arc<AttrCache>,
    read_ahead: Arc<ReadAheadPool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Builds every singleton from one [`ExportPolicy`] snapshot and the
    /// backing [`Vfs`] implementation that answers file system calls.
    pub fn new(vfs: Arc<dyn Vfs>, policy: ExportPolicy, log_policy: LogPolicy) -> Self {
        let attr_cache = Arc::new(AttrCache::new(AttrCacheConfig {
            capacity: policy.attr_cache_size,
            positive_ttl: policy.attr_cache_ttl,
            negative_caching: policy.negative_cache_enabled,
            negative_ttl: policy.negative_cache_ttl,
        }));
        let read_ahead = Arc::new(ReadAheadPool::new(ReadAheadConfig {
            enabled: policy.read_ahead_enabled,
            window_size: policy.read_ahead_size,
            max_files: policy.read_ahead_max_files,
            max_memory: policy.read_ahead_max_memory,
        }));
        let worker_config = if policy.worker_count == 0 {
            WorkerConfig::with_default_worker_count()
        } else {
            WorkerConfig { max_workers: policy.worker_count, ..WorkerConfig::with_default_worker_count() }
        };
        let worker_config = WorkerConfig {
            batch_enabled: policy.batch_enabled,
            max_batch_size: policy.max_batch_size,
            ..worker_config
        };

        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));

        let state = Arc::new(ServerState {
            handles: HandleTable::new(),
            attr_cache: attr_cache.clone(),
            read_ahead: read_ahead.clone(),
            export: Arc::new(ExportController::new(policy)),
            metrics: Arc::new(Metrics::new()),
            vfs,
            write_verifier: dispatch::boot_write_verifier(),
            limiter: limiter.clone(),
        });

        let shared = Shared {
            export: state.export.clone(),
            limiter,
            workers: Arc::new(WorkerPool::new(worker_config)),
            metrics: state.metrics.clone(),
            log_policy,
            state,
        };

        let (shutdown_tx, _) = watch::channel(false);
        Server { shared, attr_cache, read_ahead, shutdown_tx }
    }

    /// Signals every accept loop, connection, and background task to stop.
    /// Connections finish their in-flight reply before closing.
    pub fn shutdown(&self) {
        self.shutdown_tx.send(true).ok();
    }

    /// Runs the accept loop for the combined NFS+MOUNT port until
    /// `shutdown` fires. Also starts the memory monitor and rate-limiter
    /// cleanup sweep as background tasks.
    pub async fn run(&self, listener: TcpListener) -> std::io::Result<()> {
        self.spawn_background_tasks();
        self.accept_loop(listener).await
    }

    /// Runs two accept loops concurrently: one for the combined port, one
    /// for a distinct MOUNT-only port. Used when `--mount-port` differs
    /// from `--port`.
    pub async fn run_split(&self, nfs_listener: TcpListener, mount_listener: TcpListener) -> std::io::Result<()> {
        self.spawn_background_tasks();
        let nfs = self.accept_loop(nfs_listener);
        let mount = self.accept_loop(mount_listener);
        let (a, b) = tokio::join!(nfs, mount);
        a.and(b)
    }

    fn spawn_background_tasks(&self) {
        let shutdown_rx = self.shutdown_tx.subscribe();
        let attr_cache = self.attr_cache.clone();
        let read_ahead = self.read_ahead.clone();
        tokio::spawn(memory_monitor::run(MemoryMonitorConfig::default(), attr_cache, read_ahead, shutdown_rx));

        let limiter = self.shared.limiter.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let cleanup_interval = RateLimitConfig::default().cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => limiter.cleanup(),
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    async fn accept_loop(&self, listener: TcpListener) -> std::io::Result<()> {
        let local_addr = listener.local_addr().ok();
        info!(?local_addr, "accepting connections");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => accepted,
            };
            let (socket, peer): (_, SocketAddr) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "accept failed");
                    continue;
                }
            };
            let active = self.shared.metrics.active_connections.load(std::sync::atomic::Ordering::Relaxed);
            if active as usize >= self.shared.export.get().max_connections {
                warn!(%peer, "rejecting connection: max_connections reached");
                self.shared.metrics.connections_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                continue;
            }
            let shared = self.shared.clone();
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                connection::handle(socket, peer, shared, shutdown_rx).await;
            });
        }
        Ok(())
    }
}
