//! XDR codec for the MOUNT program (RFC 1813 Appendix I).

use super::{Decoder, Encoder, Result};
use crate::vfs;

pub const PROGRAM: u32 = 100005;
pub const VERSION: u32 = 3;

pub mod proc {
    pub const NULL: u32 = 0;
    pub const MNT: u32 = 1;
    pub const DUMP: u32 = 2;
    pub const UMNT: u32 = 3;
    pub const UMNTALL: u32 = 4;
    pub const EXPORT: u32 = 5;
    pub const COUNT: u32 = 6;
}

/// `mountstat3` (RFC 1813 Appendix I).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MountStat {
    Ok,
    Perm,
    NoEnt,
    Io,
    Access,
    NotDir,
    Inval,
    NameTooLong,
    NotSupp,
    ServerFault,
}

impl MountStat {
    fn to_u32(self) -> u32 {
        match self {
            MountStat::Ok => 0,
            MountStat::Perm => 1,
            MountStat::NoEnt => 2,
            MountStat::Io => 5,
            MountStat::Access => 13,
            MountStat::NotDir => 20,
            MountStat::Inval => 22,
            MountStat::NameTooLong => 63,
            MountStat::NotSupp => 10004,
            MountStat::ServerFault => 10006,
        }
    }

    pub fn from_nfs_error(err: vfs::NfsError) -> Self {
        match err {
            vfs::NfsError::Perm | vfs::NfsError::Access => MountStat::Access,
            vfs::NfsError::NoEnt => MountStat::NoEnt,
            vfs::NfsError::NotDir => MountStat::NotDir,
            vfs::NfsError::NameTooLong => MountStat::NameTooLong,
            vfs::NfsError::NotSupp => MountStat::NotSupp,
            vfs::NfsError::Io => MountStat::Io,
            vfs::NfsError::Inval => MountStat::Inval,
            _ => MountStat::ServerFault,
        }
    }
}

pub const MAX_PATH_LEN: u32 = vfs::MAX_PATH_LEN as u32;
pub const MAX_NAME_LEN: u32 = 255;

/// MNT decodes a `dirpath`, the export path the client wants to mount.
pub fn decode_mnt_args(dec: &mut Decoder) -> Result<String> {
    dec.string("dirpath", MAX_PATH_LEN)
}

/// Encodes an `fhstatus3` success/failure reply, advertising both
/// AUTH_NONE and AUTH_SYS as acceptable flavors for the mounted export.
pub fn encode_mnt_reply(enc: &mut Encoder, result: std::result::Result<&vfs::FileHandle, vfs::NfsError>) {
    match result {
        Ok(handle) => {
            enc.u32(MountStat::Ok.to_u32());
            enc.opaque(&handle.0);
            enc.vector(&[0u32, 1u32], |enc, flavor| enc.u32(*flavor)); // AUTH_NONE, AUTH_SYS
        }
        Err(err) => enc.u32(MountStat::from_nfs_error(err).to_u32()),
    }
}

/// One entry of the DUMP reply's `mountlist` (client host + mounted path).
pub struct MountEntry {
    pub host: String,
    pub path: String,
}

pub fn encode_dump_reply(enc: &mut Encoder, entries: &[MountEntry]) {
    for entry in entries {
        enc.bool(true);
        enc.string(&entry.host);
        enc.string(&entry.path);
    }
    enc.bool(false);
}

pub fn decode_umnt_args(dec: &mut Decoder) -> Result<String> {
    dec.string("dirpath", MAX_PATH_LEN)
}

/// One entry of the EXPORT reply's `exports` list (path + allowed client groups).
pub struct ExportEntry {
    pub path: String,
    pub groups: Vec<String>,
}

pub fn encode_export_reply(enc: &mut Encoder, entries: &[ExportEntry]) {
    for entry in entries {
        enc.bool(true);
        enc.string(&entry.path);
        enc.vector(&entry.groups, |enc, g| enc.string(g));
    }
    enc.bool(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_successful_mnt_reply() {
        let handle = vfs::FileHandle(vec![1, 2, 3, 4]);
        let mut enc = Encoder::new();
        encode_mnt_reply(&mut enc, Ok(&handle));
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.u32().unwrap(), 0);
        assert_eq!(dec.opaque_var("fh", 64).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn maps_access_denied_to_mountstat() {
        assert_eq!(MountStat::from_nfs_error(vfs::NfsError::Access), MountStat::Access);
    }
}
