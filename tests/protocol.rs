//! Exercises the RPC-level dispatchers directly, encoding request bytes the
//! way a real client would and decoding the reply bytes back, against an
//! in-memory backing store. This covers what a full socket round trip would
//! (MNT -> CREATE -> WRITE -> READ -> LOOKUP -> REMOVE) without needing a
//! live TCP connection.

#[path = "../demos/in_memory/filesystem.rs"]
mod in_memory;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use nfs3d::cache::{AttrCache, AttrCacheConfig, ReadAheadConfig, ReadAheadPool};
use nfs3d::dispatch::{self, mount, nfs3, ServerState};
use nfs3d::export::{ExportController, ExportPolicy};
use nfs3d::handle_table::HandleTable;
use nfs3d::metrics::Metrics;
use nfs3d::rate_limit::{RateLimitConfig, RateLimiter};
use nfs3d::vfs::FileHandle;
use nfs3d::xdr::{nfs3 as xdr_nfs3, Decoder, Encoder};

use in_memory::InMemoryVfs;

fn peer() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn state() -> ServerState {
    ServerState {
        handles: HandleTable::new(),
        attr_cache: Arc::new(AttrCache::new(AttrCacheConfig::default())),
        read_ahead: Arc::new(ReadAheadPool::new(ReadAheadConfig::default())),
        export: Arc::new(ExportController::new(ExportPolicy::default())),
        metrics: Arc::new(Metrics::new()),
        vfs: Arc::new(InMemoryVfs::new()),
        write_verifier: dispatch::boot_write_verifier(),
        limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
    }
}

fn empty_sattr(enc: &mut Encoder) {
    enc.option(&None::<u32>, |_, _| {});
    enc.option(&None::<u32>, |_, _| {});
    enc.option(&None::<u32>, |_, _| {});
    enc.option(&None::<u64>, |_, _| {});
    enc.u32(0); // atime: DontChange
    enc.u32(0); // mtime: DontChange
}

async fn mount_root(state: &ServerState) -> FileHandle {
    let mut args = Encoder::new();
    args.string(mount::EXPORT_PATH);
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    mount::dispatch(state, peer(), nfs3d::xdr::mount::proc::MNT, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u32().unwrap(), 0, "MNT should succeed against the root export");
    let handle = dec.opaque_var("fh", 64).unwrap().to_vec();
    FileHandle(handle)
}

async fn create_file(state: &ServerState, policy: &ExportPolicy, parent: &FileHandle, name: &str) -> FileHandle {
    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, parent);
    args.string(name);
    args.u32(0); // createhow3::UNCHECKED
    empty_sattr(&mut args);
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(state, policy, peer(), xdr_nfs3::proc::CREATE, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u32().unwrap(), 0, "CREATE should succeed");
    assert!(dec.bool().unwrap(), "handle follows3 should be present");
    let handle = dec.opaque_var("fh", 64).unwrap().to_vec();
    FileHandle(handle)
}

#[tokio::test]
async fn mount_create_write_read_round_trip() {
    let state = state();
    let policy = ExportPolicy::default();
    let root = mount_root(&state).await;
    let file = create_file(&state, &policy, &root, "hello.txt").await;

    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, &file);
    args.u64(0);
    args.u32(11);
    args.u32(2); // FILE_SYNC
    args.opaque(b"hello world");
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(&state, &policy, peer(), xdr_nfs3::proc::WRITE, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u32().unwrap(), 0, "WRITE should succeed");

    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, &file);
    args.u64(0);
    args.u32(64);
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(&state, &policy, peer(), xdr_nfs3::proc::READ, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u32().unwrap(), 0, "READ should succeed");
}

#[tokio::test]
async fn getattr_reflects_a_freshly_created_file() {
    let state = state();
    let policy = ExportPolicy::default();
    let root = mount_root(&state).await;
    let file = create_file(&state, &policy, &root, "a.txt").await;

    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, &file);
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(&state, &policy, peer(), xdr_nfs3::proc::GETATTR, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u32().unwrap(), 0);
    let file_type = dec.u32().unwrap();
    assert_eq!(file_type, 1, "regular file type code");
}

#[tokio::test]
async fn remove_then_lookup_returns_noent() {
    let state = state();
    let policy = ExportPolicy::default();
    let root = mount_root(&state).await;
    create_file(&state, &policy, &root, "doomed.txt").await;

    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, &root);
    args.string("doomed.txt");
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(&state, &policy, peer(), xdr_nfs3::proc::REMOVE, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.u32().unwrap(), 0, "REMOVE should succeed");

    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, &root);
    args.string("doomed.txt");
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(&state, &policy, peer(), xdr_nfs3::proc::LOOKUP, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_ne!(dec.u32().unwrap(), 0, "a removed file must no longer resolve");
}

#[tokio::test]
async fn write_is_rejected_on_a_read_only_export() {
    let state = state();
    let mut policy = ExportPolicy::default();
    policy.read_only = true;
    let root = mount_root(&state).await;

    let mut args = Encoder::new();
    xdr_nfs3::encode_fh3(&mut args, &root);
    args.string("nope.txt");
    args.u32(0);
    empty_sattr(&mut args);
    let bytes = args.into_bytes();
    let mut dec = Decoder::new(&bytes);
    let mut enc = Encoder::new();
    nfs3::dispatch(&state, &policy, peer(), xdr_nfs3::proc::CREATE, &mut dec, &mut enc).await.unwrap();
    let bytes = enc.into_bytes();
    let mut dec = Decoder::new(&bytes);
    assert_ne!(dec.u32().unwrap(), 0, "CREATE must fail against a read-only export");
}
