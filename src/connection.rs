//! Per-connection I/O (C9): one reader task decoding RPC records and
//! dispatching them onto the shared worker pool, one writer task owning
//! the socket's write half exclusively so replies never interleave.
//!
//! Mirrors the split-socket/channel shape of a reader task, a processing
//! stage, and a dedicated stream writer, generalized from a single
//! backing operation to full NFSv3 + MOUNT dispatch, auth, and rate
//! limiting.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::dispatch::{self, ServerState};
use crate::export::ExportController;
use crate::logger::LogPolicy;
use crate::metrics::Metrics;
use crate::rate_limit::{OperationClass, RateLimiter};
use crate::vfs::NfsError;
use crate::worker::WorkerPool;
use crate::xdr::mount as xdr_mount;
use crate::xdr::nfs3 as xdr_nfs3;
use crate::xdr::rpc::{self, AcceptStat, CallHeader, OpaqueAuth, RejectStat};
use crate::xdr::{Decoder, Encoder};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Resources shared by every connection task, bundled so [`handle`] takes
/// one clone-cheap argument instead of five.
#[derive(Clone)]
pub struct Shared {
    pub state: Arc<ServerState>,
    pub export: Arc<ExportController>,
    pub limiter: Arc<RateLimiter>,
    pub workers: Arc<WorkerPool>,
    pub metrics: Arc<Metrics>,
    pub log_policy: LogPolicy,
}

/// Drives one accepted TCP connection until the peer disconnects, the
/// socket sits idle past the export's timeout, or `shutdown` fires.
pub async fn handle(socket: TcpStream, peer: SocketAddr, shared: Shared, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    if let Err(err) = socket.set_nodelay(true) {
        warn!(%peer, %err, "failed to set TCP_NODELAY");
    }
    shared.metrics.connection_opened();

    let (mut read_half, write_half) = socket.into_split();
    let (reply_tx, reply_rx) = mpsc::channel::<Vec<u8>>(shared.export.get().max_batch_size.max(32));

    let writer = tokio::spawn(writer_task(write_half, reply_rx));

    let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut scratch = [0u8; 16 * 1024];
    let idle_timeout = shared.export.get().idle_timeout;

    'outer: loop {
        loop {
            let (record, consumed) = match rpc::take_record(&buf) {
                Ok(Some(pair)) => pair,
                Ok(None) => break,
                Err(err) => {
                    warn!(%peer, connection_id, %err, "oversized RPC record, closing connection");
                    break 'outer;
                }
            };
            buf.drain(..consumed);
            let workers = shared.workers.clone();
            let job_shared = shared.clone();
            let reply_tx = reply_tx.clone();
            workers
                .submit(Box::pin(async move {
                    if let Some(reply) = handle_call(&job_shared, peer, connection_id, record).await {
                        let _ = reply_tx.send(reply).await;
                    }
                }))
                .await;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break 'outer,
            read = tokio::time::timeout(idle_timeout, read_half.read(&mut scratch)) => {
                match read {
                    Err(_) => {
                        debug!(%peer, connection_id, "connection idle timeout");
                        shared.metrics.connection_timeouts.fetch_add(1, Ordering::Relaxed);
                        break 'outer;
                    }
                    Ok(Ok(0)) => break 'outer,
                    Ok(Ok(n)) => buf.extend_from_slice(&scratch[..n]),
                    Ok(Err(err)) => {
                        warn!(%peer, connection_id, %err, "connection read error");
                        break 'outer;
                    }
                }
            }
        }
    }

    drop(reply_tx);
    let _ = writer.await;
    shared.limiter.forget_connection(connection_id);
    shared.metrics.connection_closed();
}

async fn writer_task(mut write_half: tokio::net::tcp::OwnedWriteHalf, mut reply_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = reply_rx.recv().await {
        if write_half.write_all(&bytes).await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Decodes, rate-limits, authenticates, and dispatches one RPC record,
/// returning the framed reply bytes to send back — or `None` when the
/// record was malformed below even the RPC header (nothing useful to
/// reply with).
async fn handle_call(shared: &Shared, peer: SocketAddr, connection_id: u64, record: Vec<u8>) -> Option<Vec<u8>> {
    let mut dec = Decoder::new(&record);
    let header = match CallHeader::decode(&mut dec) {
        Ok(header) => header,
        Err(err) => {
            debug!(%peer, %err, "dropping unparseable RPC call");
            return None;
        }
    };

    if header.rpc_version != rpc::RPC_VERSION {
        return Some(rpc::encode_rejected_reply(header.xid, RejectStat::RpcMismatch { low: 2, high: 2 }));
    }

    let class = operation_class(header.program, header.procedure);
    if !shared.limiter.allow(peer.ip(), connection_id, class, 0) {
        shared.metrics.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
        // The call itself succeeded at the RPC layer; the procedure body
        // carries NFSERR_DELAY so the client retries instead of treating
        // this as a hard RPC failure.
        let mut enc = rpc::encode_accepted_reply(header.xid, &OpaqueAuth::none(), AcceptStat::Success);
        enc.u32(xdr_nfs3::status_code(NfsError::Delay));
        return Some(rpc::frame(enc.into_bytes()));
    }

    let mut ctx = AuthContext::from_credential(peer.ip(), peer.port(), &header.credential);
    let policy = shared.export.get();
    ctx.apply_squash(policy.squash);
    if !policy.allows_client(peer.ip()) {
        shared.metrics.auth_failures.fetch_add(1, Ordering::Relaxed);
        return Some(rpc::encode_rejected_reply(header.xid, RejectStat::AuthError(rpc::AuthStat::BadCred)));
    }

    shared.log_policy.log_operation(procedure_name(&header), peer.ip());

    let outcome = match header.program {
        xdr_nfs3::PROGRAM if header.version == xdr_nfs3::VERSION => {
            if header.procedure >= xdr_nfs3::proc::COUNT {
                Outcome::Stat(AcceptStat::ProcUnavail)
            } else {
                let mut enc = rpc::encode_accepted_reply(header.xid, &OpaqueAuth::none(), AcceptStat::Success);
                match dispatch::nfs3::dispatch(&shared.state, &policy, peer.ip(), header.procedure, &mut dec, &mut enc).await {
                    Ok(()) => Outcome::Reply(enc),
                    Err(_) => Outcome::Stat(AcceptStat::GarbageArgs),
                }
            }
        }
        xdr_nfs3::PROGRAM => Outcome::Stat(AcceptStat::ProgMismatch { low: xdr_nfs3::VERSION, high: xdr_nfs3::VERSION }),
        xdr_mount::PROGRAM if header.version == xdr_mount::VERSION => {
            if header.procedure >= xdr_mount::proc::COUNT {
                Outcome::Stat(AcceptStat::ProcUnavail)
            } else {
                let mut enc = rpc::encode_accepted_reply(header.xid, &OpaqueAuth::none(), AcceptStat::Success);
                match dispatch::mount::dispatch(&shared.state, peer.ip(), header.procedure, &mut dec, &mut enc).await {
                    Ok(()) => Outcome::Reply(enc),
                    Err(_) => Outcome::Stat(AcceptStat::GarbageArgs),
                }
            }
        }
        xdr_mount::PROGRAM => Outcome::Stat(AcceptStat::ProgMismatch { low: xdr_mount::VERSION, high: xdr_mount::VERSION }),
        _ => Outcome::Stat(AcceptStat::ProgUnavail),
    };

    let bytes = match outcome {
        Outcome::Reply(enc) => enc.into_bytes(),
        Outcome::Stat(stat) => {
            if matches!(stat, AcceptStat::GarbageArgs) {
                shared.metrics.record_error("garbage_args");
            }
            rpc::encode_accepted_reply(header.xid, &OpaqueAuth::none(), stat).into_bytes()
        }
    };
    Some(rpc::frame(bytes))
}

enum Outcome {
    Reply(Encoder),
    Stat(AcceptStat),
}

fn operation_class(program: u32, procedure: u32) -> OperationClass {
    if program == xdr_mount::PROGRAM && procedure == xdr_mount::proc::MNT {
        return OperationClass::Mount;
    }
    if program == xdr_nfs3::PROGRAM && matches!(procedure, xdr_nfs3::proc::READDIR | xdr_nfs3::proc::READDIRPLUS) {
        return OperationClass::ReadDir;
    }
    OperationClass::Normal
}

fn procedure_name(header: &CallHeader) -> &'static str {
    if header.program == xdr_mount::PROGRAM {
        "mount"
    } else {
        "nfs3"
    }
}
