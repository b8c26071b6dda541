//! NFSv3 procedure dispatcher (RFC 1813 §3). Decodes one procedure's
//! arguments, consults the caches, drives the backing [`Vfs`], and encodes
//! the reply — all directly onto the [`Encoder`] the RPC layer already
//! seeded with the accepted-reply header.

use std::net::IpAddr;

use crate::cache::Lookup;
use crate::export::ExportPolicy;
use crate::vfs::{self, NfsError};
use crate::xdr::nfs3::{self, proc};
use crate::xdr::{Decoder, Encoder, Result as XdrResult};

use super::ServerState;

/// Dispatches one NFSv3 call. A decode failure (garbage arguments) is the
/// only case that propagates an `Err` — every backing-store or cache error
/// is instead folded into the procedure's `nfsstat3` reply.
pub async fn dispatch(
    state: &ServerState,
    policy: &ExportPolicy,
    peer: IpAddr,
    procedure: u32,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    state.metrics.record_operation(procedure);
    match procedure {
        proc::NULL => {
            state.vfs.null().await.ok();
            nfs3::encode_null_reply(enc);
        }
        proc::GETATTR => getattr(state, dec, enc).await?,
        proc::SETATTR => setattr(state, policy, dec, enc).await?,
        proc::LOOKUP => lookup(state, peer, dec, enc).await?,
        proc::ACCESS => access(state, dec, enc).await?,
        proc::READLINK => readlink(state, dec, enc).await?,
        proc::READ => read(state, dec, enc).await?,
        proc::WRITE => write(state, policy, dec, enc).await?,
        proc::CREATE => create(state, policy, peer, dec, enc).await?,
        proc::MKDIR => mkdir(state, policy, peer, dec, enc).await?,
        proc::SYMLINK => symlink(state, policy, peer, dec, enc).await?,
        proc::MKNOD => mknod(state, policy, peer, dec, enc).await?,
        proc::REMOVE => remove(state, policy, dec, enc).await?,
        proc::RMDIR => rmdir(state, policy, dec, enc).await?,
        proc::RENAME => rename(state, policy, dec, enc).await?,
        proc::LINK => link(state, policy, dec, enc).await?,
        proc::READDIR => readdir(state, dec, enc).await?,
        proc::READDIRPLUS => readdirplus(state, dec, enc).await?,
        proc::FSSTAT => fsstat(state, dec, enc).await?,
        proc::FSINFO => fsinfo(state, dec, enc).await?,
        proc::PATHCONF => pathconf(state, dec, enc).await?,
        proc::COMMIT => commit(state, dec, enc).await?,
        _ => {}
    }
    Ok(())
}

fn record_error(state: &ServerState, err: NfsError) {
    state.metrics.record_error(error_kind(err));
}

fn error_kind(err: NfsError) -> &'static str {
    use NfsError::*;
    match err {
        Perm | Access => "access",
        NoEnt => "not_found",
        Stale | BadHandle => "stale_handle",
        Io => "io",
        RoFs => "read_only",
        Exist => "exists",
        NotDir | IsDir => "wrong_type",
        Delay => "rate_limited",
        _ => "other",
    }
}

async fn getattr(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let handle = nfs3::decode_getattr_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&handle)?;
        match state.attr_cache.get(&object.path) {
            Lookup::Hit(attr) => Ok(attr),
            Lookup::NegativeHit => Err(NfsError::NoEnt),
            Lookup::Miss => {
                let attr = state.vfs.get_attr(&object.backing).await?;
                state.attr_cache.put_positive(object.path.clone(), attr.clone());
                Ok(attr)
            }
        }
    }
    .await;
    match &result {
        Ok(attr) => nfs3::encode_getattr_reply(enc, Ok(attr)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_getattr_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn setattr(
    state: &ServerState,
    policy: &ExportPolicy,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_setattr_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let object = state.resolve_wire(&args.handle).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        match state.vfs.set_attr(&object.backing, args.attr, args.guard).await {
            Ok(wcc) => {
                state.invalidate_path(&object.path);
                if let Some(attr) = &wcc.after {
                    state.attr_cache.put_positive(object.path.clone(), attr.clone());
                }
                Ok(wcc)
            }
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(wcc) => nfs3::encode_setattr_reply(enc, Ok(wcc)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_setattr_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn lookup(state: &ServerState, peer: IpAddr, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let args = nfs3::decode_lookup_args(dec)?;
    let result = lookup_inner(state, peer, &args).await;
    match &result {
        Ok(r) => nfs3::encode_lookup_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_lookup_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn lookup_inner(state: &ServerState, peer: IpAddr, args: &nfs3::LookupArgs) -> Result<vfs::LookupResult, NfsError> {
    let parent = state.resolve_wire(&args.parent)?;
    let child_path = ServerState::child_path(&parent.path, &args.name.0);
    if matches!(state.attr_cache.get(&child_path), Lookup::NegativeHit) {
        return Err(NfsError::NoEnt);
    }
    match state.vfs.lookup(&parent.backing, &args.name).await {
        Ok(r) => {
            state.attr_cache.put_positive(child_path.clone(), r.object_attr.clone());
            let is_directory = r.object_attr.file_type == vfs::FileType::Directory;
            let wire = state.bind_child(peer, child_path, r.handle.clone(), is_directory)?;
            Ok(vfs::LookupResult { handle: wire, ..r })
        }
        Err(NfsError::NoEnt) => {
            state.attr_cache.put_negative(child_path.clone());
            Err(NfsError::NoEnt)
        }
        Err(err) => Err(err),
    }
}

async fn access(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let args = nfs3::decode_access_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&args.handle)?;
        state.vfs.access(&object.backing, args.mask).await
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_access_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_access_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn readlink(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let handle = nfs3::decode_readlink_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&handle)?;
        state.vfs.read_link(&object.backing).await
    }
    .await;
    match &result {
        Ok((target, attr)) => nfs3::encode_readlink_reply(enc, Ok((target, attr))),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_readlink_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn read(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let args = nfs3::decode_read_args(dec)?;
    let started = std::time::Instant::now();
    let result = async {
        let object = state.resolve_wire(&args.handle)?;
        if let Some(data) = state.read_ahead.read(&object.path, args.offset, args.count) {
            let attr = match state.attr_cache.get(&object.path) {
                Lookup::Hit(attr) => Some(attr),
                _ => None,
            };
            let eof = (data.len() as u32) < args.count;
            return Ok(vfs::ReadResult { data, eof, file_attr: attr });
        }
        let result = state.vfs.read(&object.backing, args.offset, args.count).await?;
        state.read_ahead.populate(object.path.clone(), args.offset, result.data.clone());
        if let Some(attr) = &result.file_attr {
            state.attr_cache.put_positive(object.path.clone(), attr.clone());
        }
        Ok(result)
    }
    .await;
    state.metrics.read_latency.observe(started.elapsed());
    match &result {
        Ok(r) => nfs3::encode_read_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_read_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn write(
    state: &ServerState,
    policy: &ExportPolicy,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_write_args(dec)?;
    let started = std::time::Instant::now();
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let object = state.resolve_wire(&args.handle).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        match state.vfs.write(&object.backing, args.offset, &args.data, args.mode).await {
            Ok(r) => {
                state.invalidate_path(&object.path);
                if let Some(attr) = &r.file_attr {
                    state.attr_cache.put_positive(object.path.clone(), attr.clone());
                }
                Ok(r)
            }
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    state.metrics.write_latency.observe(started.elapsed());
    match &result {
        Ok(r) => nfs3::encode_write_reply(enc, Ok(r)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_write_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

/// Shared shape for CREATE/MKDIR/SYMLINK: resolve the parent, reject on a
/// read-only export, bind the new object to a wire handle, and invalidate
/// the name that just came into existence. Fails with `NFSERR_DELAY` if
/// binding the new handle would exceed a live-handle ceiling (§4.6).
fn finish_created(
    state: &ServerState,
    peer: IpAddr,
    parent_path: &std::path::Path,
    name: &str,
    node: vfs::CreatedNode,
) -> Result<vfs::CreatedNode, NfsError> {
    let child_path = ServerState::child_path(parent_path, name);
    let is_directory = node.attr.file_type == vfs::FileType::Directory;
    let wire = state.bind_child(peer, child_path.clone(), node.handle.clone(), is_directory)?;
    state.invalidate_path(&child_path);
    state.invalidate_path(parent_path);
    // Conservative, as in rename(): a new entry in this directory can make
    // other cached negative lookups under it stale.
    state.invalidate_negatives_under(parent_path);
    Ok(vfs::CreatedNode { handle: wire, ..node })
}

async fn create(
    state: &ServerState,
    policy: &ExportPolicy,
    peer: IpAddr,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_create_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let parent = state.resolve_wire(&args.parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        match state.vfs.create(&parent.backing, &args.name, args.mode).await {
            Ok(node) => finish_created(state, peer, &parent.path, &args.name.0, node).map_err(|err| (err, empty_wcc())),
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(node) => nfs3::encode_create_reply(enc, Ok(node)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_create_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn mkdir(
    state: &ServerState,
    policy: &ExportPolicy,
    peer: IpAddr,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_mkdir_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let parent = state.resolve_wire(&args.parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        match state.vfs.make_dir(&parent.backing, &args.name, args.attr).await {
            Ok(node) => finish_created(state, peer, &parent.path, &args.name.0, node).map_err(|err| (err, empty_wcc())),
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(node) => nfs3::encode_create_reply(enc, Ok(node)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_create_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn symlink(
    state: &ServerState,
    policy: &ExportPolicy,
    peer: IpAddr,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_symlink_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let parent = state.resolve_wire(&args.parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        match state.vfs.make_symlink(&parent.backing, &args.name, &args.target, args.attr).await {
            Ok(node) => finish_created(state, peer, &parent.path, &args.name.0, node).map_err(|err| (err, empty_wcc())),
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(node) => nfs3::encode_create_reply(enc, Ok(node)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_create_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn mknod(
    state: &ServerState,
    policy: &ExportPolicy,
    peer: IpAddr,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_mknod_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let parent = state.resolve_wire(&args.parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        match state.vfs.make_node(&parent.backing, &args.name, args.node).await {
            Ok(node) => finish_created(state, peer, &parent.path, &args.name.0, node).map_err(|err| (err, empty_wcc())),
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(node) => nfs3::encode_create_reply(enc, Ok(node)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_create_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn remove(
    state: &ServerState,
    policy: &ExportPolicy,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_diropargs3(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let parent = state.resolve_wire(&args.parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        let child_path = ServerState::child_path(&parent.path, &args.name.0);
        match state.vfs.remove(&parent.backing, &args.name).await {
            Ok(removal) => {
                state.forget_path(&child_path);
                state.invalidate_path(&parent.path);
                Ok(removal)
            }
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_removal_reply(enc, Ok(r)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_removal_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn rmdir(
    state: &ServerState,
    policy: &ExportPolicy,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_diropargs3(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let parent = state.resolve_wire(&args.parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        let child_path = ServerState::child_path(&parent.path, &args.name.0);
        match state.vfs.remove_dir(&parent.backing, &args.name).await {
            Ok(removal) => {
                state.forget_path(&child_path);
                state.invalidate_path(&parent.path);
                Ok(removal)
            }
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_removal_reply(enc, Ok(r)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_removal_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn rename(
    state: &ServerState,
    policy: &ExportPolicy,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_rename_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let from_parent = state.resolve_wire(&args.from_parent).map_err(|err| (err, empty_wcc(), empty_wcc()))?;
        let to_parent = state.resolve_wire(&args.to_parent).map_err(|err| (err, empty_wcc(), empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc(), empty_wcc()));
        }
        let from_path = ServerState::child_path(&from_parent.path, &args.from_name.0);
        let to_path = ServerState::child_path(&to_parent.path, &args.to_name.0);
        match state
            .vfs
            .rename(&from_parent.backing, &args.from_name, &to_parent.backing, &args.to_name)
            .await
        {
            Ok(r) => {
                state.rename_path(&from_path, &to_path);
                state.invalidate_path(&from_path);
                state.invalidate_path(&to_path);
                state.invalidate_path(&from_parent.path);
                state.invalidate_path(&to_parent.path);
                // Conservative: a move can make either directory's negative
                // entries stale (a name that used to miss may now resolve).
                state.invalidate_negatives_under(&from_parent.path);
                state.invalidate_negatives_under(&to_parent.path);
                Ok(r)
            }
            Err(err) => Err((err, empty_wcc(), empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_rename_reply(enc, Ok(r)),
        Err((err, from_wcc, to_wcc)) => {
            record_error(state, *err);
            nfs3::encode_rename_reply(enc, Err((*err, from_wcc.clone(), to_wcc.clone())));
        }
    }
    Ok(())
}

async fn link(
    state: &ServerState,
    policy: &ExportPolicy,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    let args = nfs3::decode_link_args(dec)?;
    let empty_wcc = || vfs::WccData { before: None, after: None };
    let result = async {
        let source = state.resolve_wire(&args.source).map_err(|err| (err, empty_wcc()))?;
        let new_parent = state.resolve_wire(&args.new_parent).map_err(|err| (err, empty_wcc()))?;
        if policy.read_only {
            return Err((NfsError::RoFs, empty_wcc()));
        }
        let new_path = ServerState::child_path(&new_parent.path, &args.new_name.0);
        match state.vfs.link(&source.backing, &new_parent.backing, &args.new_name).await {
            Ok(r) => {
                state.invalidate_path(&new_path);
                state.invalidate_path(&new_parent.path);
                state.invalidate_path(&source.path);
                Ok(r)
            }
            Err(err) => Err((err, empty_wcc())),
        }
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_link_reply(enc, Ok(r)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_link_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}

async fn readdir(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let args = nfs3::decode_readdir_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&args.handle)?;
        state.vfs.read_dir(&object.backing, args.cookie, args.verifier, args.count).await
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_readdir_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_readdir_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn readdirplus(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let args = nfs3::decode_readdirplus_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&args.handle)?;
        let mut r = state
            .vfs
            .read_dir_plus(&object.backing, args.cookie, args.verifier, args.dir_count, args.max_count)
            .await?;
        // The backend's native handles aren't wire handles; clients follow
        // up each entry with LOOKUP to bind one, same as a server that
        // omits handles from READDIRPLUS entirely (RFC 1813 §3.3.17).
        for entry in &mut r.entries {
            entry.handle = None;
        }
        Ok(r)
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_readdirplus_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_readdirplus_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn fsstat(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let handle = nfs3::decode_fsstat_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&handle)?;
        state.vfs.fs_stat(&object.backing).await
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_fsstat_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_fsstat_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn fsinfo(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let handle = nfs3::decode_fsinfo_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&handle)?;
        state.vfs.fs_info(&object.backing).await
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_fsinfo_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_fsinfo_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn pathconf(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let handle = nfs3::decode_pathconf_args(dec)?;
    let result = async {
        let object = state.resolve_wire(&handle)?;
        state.vfs.path_conf(&object.backing).await
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_pathconf_reply(enc, Ok(r)),
        Err(err) => {
            record_error(state, *err);
            nfs3::encode_pathconf_reply(enc, Err(*err));
        }
    }
    Ok(())
}

async fn commit(state: &ServerState, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let args = nfs3::decode_commit_args(dec)?;
    let result = async {
        let object = state
            .resolve_wire(&args.handle)
            .map_err(|err| (err, vfs::WccData { before: None, after: None }))?;
        state
            .vfs
            .commit(&object.backing, args.offset, args.count)
            .await
            .map_err(|err| (err, vfs::WccData { before: None, after: None }))
    }
    .await;
    match &result {
        Ok(r) => nfs3::encode_commit_reply(enc, Ok(r)),
        Err((err, wcc)) => {
            record_error(state, *err);
            nfs3::encode_commit_reply(enc, Err((*err, wcc.clone())));
        }
    }
    Ok(())
}
