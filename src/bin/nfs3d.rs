//! Reference `nfs3d` launcher: wires the CLI/config surface to a
//! host-filesystem-backed export and runs the server until Ctrl-C.

#[path = "../../demos/shadow_fs/fs/mod.rs"]
mod shadow_fs;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nfs3d::config::{build_export_policy, Cli};
use nfs3d::logger::LogPolicy;
use nfs3d::server::Server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("debug") } else { EnvFilter::new("info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let policy = build_export_policy(&cli).unwrap_or_else(|err| {
        eprintln!("config error: {err}");
        std::process::exit(1);
    });

    let log_policy = LogPolicy { log_client_ips: true, log_operations: cli.debug, log_file_access: cli.debug };
    let vfs = Arc::new(shadow_fs::ShadowFS::new(cli.export.clone()));
    let bound_port = policy.bound_port;
    let mount_port = cli.mount_port();
    let server = Server::new(vfs, policy, log_policy);

    if cli.portmapper {
        tracing::warn!("portmapper registration requested but not implemented; clients must specify ports directly");
    }

    if mount_port == bound_port {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", bound_port)).await?;
        tracing::info!(port = bound_port, export = ?cli.export, "nfs3d listening");
        server.run(listener).await
    } else {
        let nfs_listener = tokio::net::TcpListener::bind(("0.0.0.0", bound_port)).await?;
        let mount_listener = tokio::net::TcpListener::bind(("0.0.0.0", mount_port)).await?;
        tracing::info!(port = bound_port, mount_port, export = ?cli.export, "nfs3d listening");
        server.run_split(nfs_listener, mount_listener).await
    }
}
