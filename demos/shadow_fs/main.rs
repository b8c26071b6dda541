use std::path::PathBuf;
use std::sync::Arc;

pub mod fs;

use nfs3d::export::ExportPolicy;
use nfs3d::logger::LogPolicy;
use nfs3d::server::Server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let path = std::env::args().nth(1).expect("must supply directory to mirror");
    let path = PathBuf::from(path);

    tracing_subscriber::fmt().init();

    let vfs = Arc::new(fs::ShadowFS::new(path.clone()));
    let policy = ExportPolicy::default();
    let port = policy.bound_port;
    let server = Server::new(vfs, policy, LogPolicy::default());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    println!("ShadowFS rooted at {:?}, listening on port {port}", path);
    server.run(listener).await
}
