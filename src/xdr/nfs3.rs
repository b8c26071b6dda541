//! XDR codec for the NFSv3 program (RFC 1813).
//!
//! Each procedure has a `decode_*_args` function and an `encode_*_reply`
//! function. Replies always start with the `nfsstat3` discriminant, so the
//! dispatcher passes in a [`crate::vfs::NfsError`] (or `None` for success)
//! rather than the caller pre-encoding the status itself.

use super::{Decoder, Encoder, Error, Result};
use crate::vfs;

pub const PROGRAM: u32 = 100003;
pub const VERSION: u32 = 3;

pub mod proc {
    pub const NULL: u32 = 0;
    pub const GETATTR: u32 = 1;
    pub const SETATTR: u32 = 2;
    pub const LOOKUP: u32 = 3;
    pub const ACCESS: u32 = 4;
    pub const READLINK: u32 = 5;
    pub const READ: u32 = 6;
    pub const WRITE: u32 = 7;
    pub const CREATE: u32 = 8;
    pub const MKDIR: u32 = 9;
    pub const SYMLINK: u32 = 10;
    pub const MKNOD: u32 = 11;
    pub const REMOVE: u32 = 12;
    pub const RMDIR: u32 = 13;
    pub const RENAME: u32 = 14;
    pub const LINK: u32 = 15;
    pub const READDIR: u32 = 16;
    pub const READDIRPLUS: u32 = 17;
    pub const FSSTAT: u32 = 18;
    pub const FSINFO: u32 = 19;
    pub const PATHCONF: u32 = 20;
    pub const COMMIT: u32 = 21;
    pub const COUNT: u32 = 22;
}

/// Maps a backing-filesystem error onto the wire `nfsstat3` value
/// (RFC 1813 §2.6 / spec §4.10).
pub fn status_code(err: vfs::NfsError) -> u32 {
    use vfs::NfsError::*;
    match err {
        Perm => 1,
        NoEnt => 2,
        Io => 5,
        NxIo => 6,
        Access => 13,
        Exist => 17,
        XDev => 18,
        Nodev => 19,
        NotDir => 20,
        IsDir => 21,
        Inval => 22,
        FBig => 27,
        NoSpc => 28,
        RoFs => 30,
        MLink => 31,
        NameTooLong => 63,
        NotEmpty => 66,
        DQuot => 69,
        Stale => 70,
        Remote => 71,
        BadHandle => 10001,
        NotSync => 10002,
        BadCookie => 10003,
        NotSupp => 10004,
        TooSmall => 10005,
        ServerFault => 10006,
        BadType => 10007,
        Jukebox => 10008,
        Delay => 10013,
    }
}

fn encode_status(enc: &mut Encoder, err: Option<vfs::NfsError>) {
    enc.u32(err.map(status_code).unwrap_or(0));
}

// ---- fhandle3 / filename3 / nfspath3 ----

pub fn decode_fh3(dec: &mut Decoder) -> Result<vfs::FileHandle> {
    let bytes = dec.opaque_var("fhandle3", vfs::MAX_FILE_HANDLE_LEN as u32)?;
    Ok(vfs::FileHandle(bytes.to_vec()))
}

pub fn encode_fh3(enc: &mut Encoder, handle: &vfs::FileHandle) {
    enc.opaque(&handle.0);
}

pub fn decode_filename3(dec: &mut Decoder) -> Result<vfs::FileName> {
    let s = dec.string("filename3", vfs::MAX_NAME_LEN as u32)?;
    Ok(vfs::FileName(s))
}

pub fn decode_path3(dec: &mut Decoder) -> Result<vfs::SymlinkTarget> {
    let s = dec.string("nfspath3", vfs::MAX_PATH_LEN as u32)?;
    Ok(vfs::SymlinkTarget(s))
}

// ---- time / attributes ----

fn decode_time(dec: &mut Decoder) -> Result<vfs::FileTime> {
    let seconds = dec.u32()? as i64;
    let nanos = dec.u32()?;
    Ok(vfs::FileTime { seconds, nanos })
}

fn encode_time(enc: &mut Encoder, t: vfs::FileTime) {
    enc.u32(t.seconds as u32);
    enc.u32(t.nanos);
}

fn file_type_code(t: vfs::FileType) -> u32 {
    match t {
        vfs::FileType::Regular => 1,
        vfs::FileType::Directory => 2,
        vfs::FileType::BlockDevice => 3,
        vfs::FileType::CharacterDevice => 4,
        vfs::FileType::Symlink => 5,
        vfs::FileType::Socket => 6,
        vfs::FileType::Fifo => 7,
    }
}

pub fn encode_fattr3(enc: &mut Encoder, attr: &vfs::FileAttr) {
    enc.u32(file_type_code(attr.file_type));
    enc.u32(attr.mode);
    enc.u32(attr.nlink);
    enc.u32(attr.uid);
    enc.u32(attr.gid);
    enc.u64(attr.size);
    enc.u64(attr.used);
    let (major, minor) = attr.device.map(|d| (d.major, d.minor)).unwrap_or((0, 0));
    enc.u32(major);
    enc.u32(minor);
    enc.u64(attr.fsid);
    enc.u64(attr.fileid);
    encode_time(enc, attr.atime);
    encode_time(enc, attr.mtime);
    encode_time(enc, attr.ctime);
}

pub fn encode_post_op_attr(enc: &mut Encoder, attr: &Option<vfs::FileAttr>) {
    enc.option(attr, |enc, a| encode_fattr3(enc, a));
}

pub fn encode_wcc_data(enc: &mut Encoder, wcc: &vfs::WccData) {
    enc.option(&wcc.before, |enc, digest| {
        enc.u64(digest.size);
        encode_time(enc, digest.mtime);
        encode_time(enc, digest.ctime);
    });
    encode_post_op_attr(enc, &wcc.after);
}

fn decode_set_time(dec: &mut Decoder) -> Result<vfs::SetTime> {
    match dec.u32()? {
        0 => Ok(vfs::SetTime::DontChange),
        1 => Ok(vfs::SetTime::ServerCurrent),
        2 => Ok(vfs::SetTime::ClientProvided(decode_time(dec)?)),
        other => Err(Error::BadDiscriminant { field: "set_time", value: other }),
    }
}

pub fn decode_sattr3(dec: &mut Decoder) -> Result<vfs::SetAttr> {
    let mode = dec.option(|d| d.u32())?;
    let uid = dec.option(|d| d.u32())?;
    let gid = dec.option(|d| d.u32())?;
    let size = dec.option(|d| d.u64())?;
    let atime = decode_set_time(dec)?;
    let mtime = decode_set_time(dec)?;
    Ok(vfs::SetAttr { mode, uid, gid, size, atime, mtime })
}

fn decode_sattrguard3(dec: &mut Decoder) -> Result<vfs::SetAttrGuard> {
    match dec.option(|d| decode_time(d))? {
        Some(ctime) => Ok(vfs::SetAttrGuard::Check { ctime }),
        None => Ok(vfs::SetAttrGuard::None),
    }
}

// ---- NULL ----

pub fn encode_null_reply(enc: &mut Encoder) {
    let _ = enc;
}

// ---- GETATTR ----

pub fn decode_getattr_args(dec: &mut Decoder) -> Result<vfs::FileHandle> {
    decode_fh3(dec)
}

pub fn encode_getattr_reply(enc: &mut Encoder, result: std::result::Result<&vfs::FileAttr, vfs::NfsError>) {
    match result {
        Ok(attr) => {
            encode_status(enc, None);
            encode_fattr3(enc, attr);
        }
        Err(err) => encode_status(enc, Some(err)),
    }
}

// ---- SETATTR ----

pub struct SetAttrArgs {
    pub handle: vfs::FileHandle,
    pub attr: vfs::SetAttr,
    pub guard: vfs::SetAttrGuard,
}

pub fn decode_setattr_args(dec: &mut Decoder) -> Result<SetAttrArgs> {
    let handle = decode_fh3(dec)?;
    let attr = decode_sattr3(dec)?;
    let guard = decode_sattrguard3(dec)?;
    Ok(SetAttrArgs { handle, attr, guard })
}

pub fn encode_setattr_reply(enc: &mut Encoder, result: Result3<&vfs::WccData>) {
    match result {
        Ok(wcc) => {
            encode_status(enc, None);
            encode_wcc_data(enc, wcc);
        }
        Err((err, wcc)) => {
            encode_status(enc, Some(err));
            encode_wcc_data(enc, &wcc);
        }
    }
}

// ---- LOOKUP ----

pub struct LookupArgs {
    pub parent: vfs::FileHandle,
    pub name: vfs::FileName,
}

pub fn decode_lookup_args(dec: &mut Decoder) -> Result<LookupArgs> {
    let parent = decode_fh3(dec)?;
    let name = decode_filename3(dec)?;
    Ok(LookupArgs { parent, name })
}

pub fn encode_lookup_reply(enc: &mut Encoder, result: std::result::Result<&vfs::LookupResult, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_fh3(enc, &r.handle);
            encode_post_op_attr(enc, &Some(r.object_attr.clone()));
            encode_post_op_attr(enc, &r.directory_attr);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

// ---- ACCESS ----

pub struct AccessArgs {
    pub handle: vfs::FileHandle,
    pub mask: vfs::AccessMask,
}

pub fn decode_access_args(dec: &mut Decoder) -> Result<AccessArgs> {
    let handle = decode_fh3(dec)?;
    let mask = vfs::AccessMask::from_bits_truncate(dec.u32()?);
    Ok(AccessArgs { handle, mask })
}

pub fn encode_access_reply(enc: &mut Encoder, result: std::result::Result<&vfs::AccessResult, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.file_attr);
            enc.u32(r.granted.bits());
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

// ---- READLINK ----

pub fn decode_readlink_args(dec: &mut Decoder) -> Result<vfs::FileHandle> {
    decode_fh3(dec)
}

pub fn encode_readlink_reply(
    enc: &mut Encoder,
    result: std::result::Result<(&vfs::SymlinkTarget, &Option<vfs::FileAttr>), vfs::NfsError>,
) {
    match result {
        Ok((target, attr)) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, attr);
            enc.string(&target.0);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

// ---- READ ----

pub struct ReadArgs {
    pub handle: vfs::FileHandle,
    pub offset: u64,
    pub count: u32,
}

pub fn decode_read_args(dec: &mut Decoder) -> Result<ReadArgs> {
    let handle = decode_fh3(dec)?;
    let offset = dec.u64()?;
    let count = dec.u32()?;
    Ok(ReadArgs { handle, offset, count })
}

pub fn encode_read_reply(enc: &mut Encoder, result: std::result::Result<&vfs::ReadResult, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.file_attr);
            enc.u32(r.data.len() as u32);
            enc.bool(r.eof);
            enc.opaque(&r.data);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

// ---- WRITE ----

pub struct WriteArgs {
    pub handle: vfs::FileHandle,
    pub offset: u64,
    pub mode: vfs::WriteMode,
    pub data: Vec<u8>,
}

/// Upper bound on a single WRITE payload; larger requests are rejected
/// before allocation rather than trusting the client's declared count.
pub const MAX_WRITE_PAYLOAD: u32 = 1 << 20;

fn decode_stable_how(v: u32) -> Result<vfs::WriteMode> {
    match v {
        0 => Ok(vfs::WriteMode::Unstable),
        1 => Ok(vfs::WriteMode::DataSync),
        2 => Ok(vfs::WriteMode::FileSync),
        other => Err(Error::BadDiscriminant { field: "stable_how", value: other }),
    }
}

fn stable_how_code(mode: vfs::WriteMode) -> u32 {
    match mode {
        vfs::WriteMode::Unstable => 0,
        vfs::WriteMode::DataSync => 1,
        vfs::WriteMode::FileSync => 2,
    }
}

pub fn decode_write_args(dec: &mut Decoder) -> Result<WriteArgs> {
    let handle = decode_fh3(dec)?;
    let offset = dec.u64()?;
    let _count = dec.u32()?;
    let mode = decode_stable_how(dec.u32()?)?;
    let data = dec.opaque_var("write_data", MAX_WRITE_PAYLOAD)?.to_vec();
    Ok(WriteArgs { handle, offset, mode, data })
}

pub fn encode_write_reply(enc: &mut Encoder, result: Result3<&vfs::WriteResult>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_wcc_data(enc, &vfs::WccData { before: None, after: r.file_attr.clone() });
            enc.u32(r.count);
            enc.u32(stable_how_code(r.committed));
            enc.opaque_fixed(&r.verifier.0);
        }
        Err((err, wcc)) => {
            encode_status(enc, Some(err));
            encode_wcc_data(enc, &wcc);
        }
    }
}

// ---- CREATE ----

pub struct CreateArgs {
    pub parent: vfs::FileHandle,
    pub name: vfs::FileName,
    pub mode: vfs::CreateMode,
}

pub fn decode_create_args(dec: &mut Decoder) -> Result<CreateArgs> {
    let parent = decode_fh3(dec)?;
    let name = decode_filename3(dec)?;
    let how = dec.u32()?;
    let mode = match how {
        0 => vfs::CreateMode::Unchecked { attr: decode_sattr3(dec)? },
        1 => vfs::CreateMode::Guarded { attr: decode_sattr3(dec)? },
        2 => vfs::CreateMode::Exclusive { verifier: dec.array::<8>()? },
        other => return Err(Error::BadDiscriminant { field: "createhow3", value: other }),
    };
    Ok(CreateArgs { parent, name, mode })
}

fn encode_created_node(enc: &mut Encoder, r: &vfs::CreatedNode) {
    enc.bool(true);
    encode_fh3(enc, &r.handle);
    encode_post_op_attr(enc, &Some(r.attr.clone()));
    encode_wcc_data(enc, &r.directory_wcc);
}

pub fn encode_create_reply(enc: &mut Encoder, result: Result3<&vfs::CreatedNode>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_created_node(enc, r);
        }
        Err((err, wcc)) => {
            encode_status(enc, Some(err));
            encode_wcc_data(enc, &wcc);
        }
    }
}

pub struct MkdirArgs {
    pub parent: vfs::FileHandle,
    pub name: vfs::FileName,
    pub attr: vfs::SetAttr,
}

pub fn decode_mkdir_args(dec: &mut Decoder) -> Result<MkdirArgs> {
    let parent = decode_fh3(dec)?;
    let name = decode_filename3(dec)?;
    let attr = decode_sattr3(dec)?;
    Ok(MkdirArgs { parent, name, attr })
}

pub struct SymlinkArgs {
    pub parent: vfs::FileHandle,
    pub name: vfs::FileName,
    pub attr: vfs::SetAttr,
    pub target: vfs::SymlinkTarget,
}

pub fn decode_symlink_args(dec: &mut Decoder) -> Result<SymlinkArgs> {
    let parent = decode_fh3(dec)?;
    let name = decode_filename3(dec)?;
    let attr = decode_sattr3(dec)?;
    let target = decode_path3(dec)?;
    Ok(SymlinkArgs { parent, name, attr, target })
}

pub struct MknodArgs {
    pub parent: vfs::FileHandle,
    pub name: vfs::FileName,
    pub node: vfs::SpecialNode,
}

pub fn decode_mknod_args(dec: &mut Decoder) -> Result<MknodArgs> {
    let parent = decode_fh3(dec)?;
    let name = decode_filename3(dec)?;
    let ftype = dec.u32()?;
    let node = match ftype {
        3 => vfs::SpecialNode::Block {
            device: decode_specdata3(dec)?,
            attr: decode_sattr3(dec)?,
        },
        4 => vfs::SpecialNode::Character {
            device: decode_specdata3(dec)?,
            attr: decode_sattr3(dec)?,
        },
        6 => vfs::SpecialNode::Socket { attr: decode_sattr3(dec)? },
        7 => vfs::SpecialNode::Fifo { attr: decode_sattr3(dec)? },
        other => return Err(Error::BadDiscriminant { field: "ftype3", value: other }),
    };
    Ok(MknodArgs { parent, name, node })
}

fn decode_specdata3(dec: &mut Decoder) -> Result<vfs::DeviceId> {
    let major = dec.u32()?;
    let minor = dec.u32()?;
    Ok(vfs::DeviceId { major, minor })
}

// ---- REMOVE / RMDIR ----

pub struct DirOpArgs {
    pub parent: vfs::FileHandle,
    pub name: vfs::FileName,
}

pub fn decode_diropargs3(dec: &mut Decoder) -> Result<DirOpArgs> {
    let parent = decode_fh3(dec)?;
    let name = decode_filename3(dec)?;
    Ok(DirOpArgs { parent, name })
}

pub fn encode_removal_reply(enc: &mut Encoder, result: Result3<&vfs::RemovalResult>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_wcc_data(enc, &r.directory_wcc);
        }
        Err((err, wcc)) => {
            encode_status(enc, Some(err));
            encode_wcc_data(enc, &wcc);
        }
    }
}

// ---- RENAME ----

pub struct RenameArgs {
    pub from_parent: vfs::FileHandle,
    pub from_name: vfs::FileName,
    pub to_parent: vfs::FileHandle,
    pub to_name: vfs::FileName,
}

pub fn decode_rename_args(dec: &mut Decoder) -> Result<RenameArgs> {
    let from = decode_diropargs3(dec)?;
    let to = decode_diropargs3(dec)?;
    Ok(RenameArgs {
        from_parent: from.parent,
        from_name: from.name,
        to_parent: to.parent,
        to_name: to.name,
    })
}

pub fn encode_rename_reply(
    enc: &mut Encoder,
    result: std::result::Result<&vfs::RenameResult, (vfs::NfsError, vfs::WccData, vfs::WccData)>,
) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_wcc_data(enc, &r.from_directory_wcc);
            encode_wcc_data(enc, &r.to_directory_wcc);
        }
        Err((err, from_wcc, to_wcc)) => {
            encode_status(enc, Some(err));
            encode_wcc_data(enc, &from_wcc);
            encode_wcc_data(enc, &to_wcc);
        }
    }
}

// ---- LINK ----

pub struct LinkArgs {
    pub source: vfs::FileHandle,
    pub new_parent: vfs::FileHandle,
    pub new_name: vfs::FileName,
}

pub fn decode_link_args(dec: &mut Decoder) -> Result<LinkArgs> {
    let source = decode_fh3(dec)?;
    let target = decode_diropargs3(dec)?;
    Ok(LinkArgs { source, new_parent: target.parent, new_name: target.name })
}

pub fn encode_link_reply(
    enc: &mut Encoder,
    result: std::result::Result<&vfs::LinkResult, (vfs::NfsError, vfs::WccData)>,
) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.new_file_attr);
            encode_wcc_data(enc, &r.directory_wcc);
        }
        Err((err, wcc)) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
            encode_wcc_data(enc, &wcc);
        }
    }
}

// ---- READDIR / READDIRPLUS ----

pub struct ReadDirArgs {
    pub handle: vfs::FileHandle,
    pub cookie: vfs::DirectoryCookie,
    pub verifier: vfs::CookieVerifier,
    pub count: u32,
}

pub fn decode_readdir_args(dec: &mut Decoder) -> Result<ReadDirArgs> {
    let handle = decode_fh3(dec)?;
    let cookie = vfs::DirectoryCookie(dec.u64()?);
    let verifier = vfs::CookieVerifier(dec.array::<8>()?);
    let count = dec.u32()?;
    Ok(ReadDirArgs { handle, cookie, verifier, count })
}

pub fn encode_readdir_reply(enc: &mut Encoder, result: std::result::Result<&vfs::ReadDirResult, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.directory_attr);
            enc.opaque_fixed(&r.cookie_verifier.0);
            for entry in &r.entries {
                enc.bool(true);
                enc.u64(entry.fileid);
                enc.string(&entry.name.0);
                enc.u64(entry.cookie.0);
            }
            enc.bool(false); // no more entries in the list
            enc.bool(r.eof);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

pub struct ReadDirPlusArgs {
    pub handle: vfs::FileHandle,
    pub cookie: vfs::DirectoryCookie,
    pub verifier: vfs::CookieVerifier,
    pub dir_count: u32,
    pub max_count: u32,
}

pub fn decode_readdirplus_args(dec: &mut Decoder) -> Result<ReadDirPlusArgs> {
    let handle = decode_fh3(dec)?;
    let cookie = vfs::DirectoryCookie(dec.u64()?);
    let verifier = vfs::CookieVerifier(dec.array::<8>()?);
    let dir_count = dec.u32()?;
    let max_count = dec.u32()?;
    Ok(ReadDirPlusArgs { handle, cookie, verifier, dir_count, max_count })
}

pub fn encode_readdirplus_reply(
    enc: &mut Encoder,
    result: std::result::Result<&vfs::ReadDirPlusResult, vfs::NfsError>,
) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.directory_attr);
            enc.opaque_fixed(&r.cookie_verifier.0);
            for entry in &r.entries {
                enc.bool(true);
                enc.u64(entry.fileid);
                enc.string(&entry.name.0);
                enc.u64(entry.cookie.0);
                encode_post_op_attr(enc, &entry.attr);
                enc.option(&entry.handle, |enc, h| encode_fh3(enc, h));
            }
            enc.bool(false);
            enc.bool(r.eof);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

// ---- FSSTAT / FSINFO / PATHCONF ----

pub fn decode_fsstat_args(dec: &mut Decoder) -> Result<vfs::FileHandle> {
    decode_fh3(dec)
}

pub fn encode_fsstat_reply(enc: &mut Encoder, result: std::result::Result<&vfs::FsStat, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.file_attr);
            enc.u64(r.total_bytes);
            enc.u64(r.free_bytes);
            enc.u64(r.available_bytes);
            enc.u64(r.total_files);
            enc.u64(r.free_files);
            enc.u64(r.available_files);
            enc.u32(r.invarsec);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

pub fn decode_fsinfo_args(dec: &mut Decoder) -> Result<vfs::FileHandle> {
    decode_fh3(dec)
}

pub fn encode_fsinfo_reply(enc: &mut Encoder, result: std::result::Result<&vfs::FsInfo, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.file_attr);
            enc.u32(r.read_max);
            enc.u32(r.read_pref);
            enc.u32(r.read_multiple);
            enc.u32(r.write_max);
            enc.u32(r.write_pref);
            enc.u32(r.write_multiple);
            enc.u32(r.directory_pref);
            enc.u64(r.max_file_size);
            encode_time(enc, r.time_delta);
            enc.u32(r.properties.bits());
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

pub fn decode_pathconf_args(dec: &mut Decoder) -> Result<vfs::FileHandle> {
    decode_fh3(dec)
}

pub fn encode_pathconf_reply(enc: &mut Encoder, result: std::result::Result<&vfs::PathConfig, vfs::NfsError>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_post_op_attr(enc, &r.file_attr);
            enc.u32(r.max_link);
            enc.u32(r.max_name);
            enc.bool(r.no_trunc);
            enc.bool(r.chown_restricted);
            enc.bool(r.case_insensitive);
            enc.bool(r.case_preserving);
        }
        Err(err) => {
            encode_status(enc, Some(err));
            encode_post_op_attr(enc, &None);
        }
    }
}

// ---- COMMIT ----

pub struct CommitArgs {
    pub handle: vfs::FileHandle,
    pub offset: u64,
    pub count: u32,
}

pub fn decode_commit_args(dec: &mut Decoder) -> Result<CommitArgs> {
    let handle = decode_fh3(dec)?;
    let offset = dec.u64()?;
    let count = dec.u32()?;
    Ok(CommitArgs { handle, offset, count })
}

pub fn encode_commit_reply(enc: &mut Encoder, result: Result3<&vfs::CommitResult>) {
    match result {
        Ok(r) => {
            encode_status(enc, None);
            encode_wcc_data(enc, &vfs::WccData { before: None, after: r.file_attr.clone() });
            enc.opaque_fixed(&r.verifier.0);
        }
        Err((err, wcc)) => {
            encode_status(enc, Some(err));
            encode_wcc_data(enc, &wcc);
        }
    }
}

/// Shorthand for results whose error arm must also carry WCC data.
pub type Result3<T> = std::result::Result<T, (vfs::NfsError, vfs::WccData)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_getattr_args() {
        let mut enc = Encoder::new();
        enc.opaque(&[1, 2, 3, 4]);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let handle = decode_getattr_args(&mut dec).unwrap();
        assert_eq!(handle.0, vec![1, 2, 3, 4]);
    }

    #[test]
    fn encodes_getattr_reply_ok() {
        let attr = vfs::FileAttr {
            file_type: vfs::FileType::Regular,
            mode: 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 10,
            used: 10,
            device: None,
            fsid: 1,
            fileid: 2,
            atime: vfs::FileTime { seconds: 1, nanos: 0 },
            mtime: vfs::FileTime { seconds: 1, nanos: 0 },
            ctime: vfs::FileTime { seconds: 1, nanos: 0 },
        };
        let mut enc = Encoder::new();
        encode_getattr_reply(&mut enc, Ok(&attr));
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.u32().unwrap(), 0);
        assert_eq!(dec.u32().unwrap(), file_type_code(vfs::FileType::Regular));
    }

    #[test]
    fn encodes_getattr_reply_err() {
        let mut enc = Encoder::new();
        encode_getattr_reply(&mut enc, Err(vfs::NfsError::NoEnt));
        let bytes = enc.into_bytes();
        assert_eq!(bytes, 2u32.to_be_bytes());
    }

    #[test]
    fn status_codes_match_rfc_values() {
        assert_eq!(status_code(vfs::NfsError::Perm), 1);
        assert_eq!(status_code(vfs::NfsError::Stale), 70);
        assert_eq!(status_code(vfs::NfsError::Jukebox), 10008);
        assert_eq!(status_code(vfs::NfsError::Delay), 10013);
    }
}
