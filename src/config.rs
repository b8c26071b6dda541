//! CLI surface and on-disk configuration for the reference launcher (§6.2).
//! The core itself only consumes an [`ExportPolicy`]; this module is the
//! ambient glue a real binary needs to build one.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::export::{ClientRule, ExportPolicy, SquashMode};

/// Reference `nfs3d` launcher CLI.
#[derive(Debug, Parser)]
#[command(name = "nfs3d", about = "A Rust NFSv3 server")]
pub struct Cli {
    /// NFS bind port.
    #[arg(long, default_value_t = 2049)]
    pub port: u16,

    /// MOUNT bind port; defaults to `--port`.
    #[arg(long)]
    pub mount_port: Option<u16>,

    /// Register with portmapper on port 111 (requires privilege).
    #[arg(long, default_value_t = false)]
    pub portmapper: bool,

    /// Enable debug logging.
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Directory to export.
    #[arg(long, default_value = ".")]
    pub export: PathBuf,

    /// Optional TOML config file layered under the CLI flags.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn mount_port(&self) -> u16 {
        self.mount_port.unwrap_or(self.port)
    }
}

/// On-disk configuration, deserialized from TOML and merged into an
/// [`ExportPolicy`].
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub read_only: Option<bool>,
    pub squash: Option<String>,
    pub attr_cache_size: Option<u64>,
    pub attr_cache_ttl_secs: Option<u64>,
    pub read_ahead_enabled: Option<bool>,
    pub read_ahead_size: Option<u32>,
    pub transfer_size: Option<u32>,
    pub idle_timeout_secs: Option<u64>,
    pub max_connections: Option<usize>,
    pub worker_count: Option<usize>,
    pub allowed_clients: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("unknown squash mode `{0}`, expected none|root|all")]
    UnknownSquash(String),
    #[error("invalid allowed-clients entry `{0}`, expected an address or address/prefix")]
    InvalidClientRule(String),
}

fn parse_client_rule(entry: &str) -> Result<ClientRule, ConfigError> {
    let bad = || ConfigError::InvalidClientRule(entry.to_owned());
    let (addr, prefix_len) = match entry.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| bad())?),
        None => (entry, if entry.contains(':') { 128 } else { 32 }),
    };
    let network: std::net::IpAddr = addr.parse().map_err(|_| bad())?;
    let max_prefix = if network.is_ipv4() { 32 } else { 128 };
    if prefix_len > max_prefix {
        return Err(bad());
    }
    Ok(ClientRule { network, prefix_len })
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }

    pub fn apply(&self, mut policy: ExportPolicy) -> Result<ExportPolicy, ConfigError> {
        if let Some(read_only) = self.read_only {
            policy.read_only = read_only;
        }
        if let Some(squash) = &self.squash {
            policy.squash = match squash.as_str() {
                "none" => SquashMode::None,
                "root" => SquashMode::Root,
                "all" => SquashMode::All,
                other => return Err(ConfigError::UnknownSquash(other.to_owned())),
            };
        }
        if let Some(size) = self.attr_cache_size {
            policy.attr_cache_size = size;
        }
        if let Some(secs) = self.attr_cache_ttl_secs {
            policy.attr_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(enabled) = self.read_ahead_enabled {
            policy.read_ahead_enabled = enabled;
        }
        if let Some(size) = self.read_ahead_size {
            policy.read_ahead_size = size;
        }
        if let Some(size) = self.transfer_size {
            policy.transfer_size = size;
        }
        if let Some(secs) = self.idle_timeout_secs {
            policy.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_connections {
            policy.max_connections = max;
        }
        if let Some(count) = self.worker_count {
            policy.worker_count = count;
        }
        if let Some(entries) = &self.allowed_clients {
            policy.allowed_clients = entries.iter().map(|entry| parse_client_rule(entry)).collect::<Result<_, _>>()?;
        }
        Ok(policy)
    }
}

/// Builds the effective [`ExportPolicy`] from CLI flags layered over an
/// optional config file.
pub fn build_export_policy(cli: &Cli) -> Result<ExportPolicy, ConfigError> {
    let mut policy = ExportPolicy { bound_port: cli.port, ..ExportPolicy::default() };
    if let Some(path) = &cli.config {
        policy = FileConfig::load(path)?.apply(policy)?;
    }
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_cli() {
        let cli = Cli::parse_from(["nfs3d", "--port", "2050"]);
        assert_eq!(cli.port, 2050);
        assert_eq!(cli.mount_port(), 2050);
    }

    #[test]
    fn file_config_rejects_unknown_squash() {
        let config = FileConfig { squash: Some("bogus".to_owned()), ..FileConfig::default() };
        assert!(config.apply(ExportPolicy::default()).is_err());
    }

    #[test]
    fn allowed_clients_parses_cidr_entries() {
        let config = FileConfig {
            allowed_clients: Some(vec!["192.168.1.0/24".to_owned(), "10.0.0.5".to_owned()]),
            ..FileConfig::default()
        };
        let policy = config.apply(ExportPolicy::default()).unwrap();
        assert_eq!(policy.allowed_clients.len(), 2);
        assert_eq!(policy.allowed_clients[1].prefix_len, 32);
    }

    #[test]
    fn allowed_clients_rejects_garbage() {
        let config = FileConfig { allowed_clients: Some(vec!["not-an-address".to_owned()]), ..FileConfig::default() };
        assert!(config.apply(ExportPolicy::default()).is_err());
    }
}
