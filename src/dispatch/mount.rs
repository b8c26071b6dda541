//! MOUNT v3 procedure dispatcher (RFC 1813 Appendix I). Much smaller than
//! the NFSv3 side: one real mountable path, no subtree exports.

use std::net::IpAddr;

use crate::xdr::mount::{self, proc};
use crate::xdr::nfs3::encode_null_reply;
use crate::xdr::{Decoder, Encoder, Result as XdrResult};

use super::ServerState;

/// Single export path every MNT/EXPORT reply refers to. Subtree exports
/// are out of scope; the whole backing file system is one export.
pub const EXPORT_PATH: &str = "/";

pub async fn dispatch(
    state: &ServerState,
    peer: IpAddr,
    procedure: u32,
    dec: &mut Decoder<'_>,
    enc: &mut Encoder,
) -> XdrResult<()> {
    match procedure {
        proc::NULL => encode_null_reply(enc),
        proc::MNT => mnt(state, peer, dec, enc).await?,
        proc::DUMP => mount::encode_dump_reply(enc, &[]),
        proc::UMNT => umnt(dec, enc)?,
        proc::UMNTALL => {}
        proc::EXPORT => mount::encode_export_reply(
            enc,
            &[mount::ExportEntry { path: EXPORT_PATH.to_string(), groups: Vec::new() }],
        ),
        _ => {}
    }
    Ok(())
}

async fn mnt(state: &ServerState, peer: IpAddr, dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    let path = mount::decode_mnt_args(dec)?;
    let result = async {
        if path != EXPORT_PATH {
            return Err(crate::vfs::NfsError::NoEnt);
        }
        let root_backing = state.vfs.root().await?;
        state.bind_child(peer, std::path::PathBuf::from(EXPORT_PATH), root_backing, true)
    }
    .await;
    mount::encode_mnt_reply(enc, result.as_ref().map_err(|e| *e));
    Ok(())
}

fn umnt(dec: &mut Decoder<'_>, enc: &mut Encoder) -> XdrResult<()> {
    mount::decode_umnt_args(dec)?;
    let _ = enc;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AttrCache, AttrCacheConfig, ReadAheadConfig, ReadAheadPool};
    use crate::export::{ExportController, ExportPolicy};
    use crate::handle_table::HandleTable;
    use crate::metrics::Metrics;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::vfs::{self, FileHandle};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn peer() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    struct StubVfs;

    #[async_trait::async_trait]
    impl vfs::Vfs for StubVfs {
        async fn null(&self) -> vfs::VfsResult<()> {
            Ok(())
        }
        async fn get_attr(&self, _: &FileHandle) -> vfs::VfsResult<vfs::FileAttr> {
            unimplemented!()
        }
        async fn set_attr(
            &self,
            _: &FileHandle,
            _: vfs::SetAttr,
            _: Option<vfs::SetAttrGuard>,
        ) -> vfs::VfsResult<vfs::WccData> {
            unimplemented!()
        }
        async fn lookup(&self, _: &FileHandle, _: &vfs::FileName) -> vfs::VfsResult<vfs::LookupResult> {
            unimplemented!()
        }
        async fn access(&self, _: &FileHandle, _: vfs::AccessMask) -> vfs::VfsResult<vfs::AccessResult> {
            unimplemented!()
        }
        async fn read_link(&self, _: &FileHandle) -> vfs::VfsResult<(vfs::SymlinkTarget, Option<vfs::FileAttr>)> {
            unimplemented!()
        }
        async fn read(&self, _: &FileHandle, _: u64, _: u32) -> vfs::VfsResult<vfs::ReadResult> {
            unimplemented!()
        }
        async fn write(&self, _: &FileHandle, _: u64, _: &[u8], _: vfs::WriteMode) -> vfs::VfsResult<vfs::WriteResult> {
            unimplemented!()
        }
        async fn create(
            &self,
            _: &FileHandle,
            _: &vfs::FileName,
            _: vfs::CreateMode,
        ) -> vfs::VfsResult<vfs::CreatedNode> {
            unimplemented!()
        }
        async fn make_dir(&self, _: &FileHandle, _: &vfs::FileName, _: vfs::SetAttr) -> vfs::VfsResult<vfs::CreatedNode> {
            unimplemented!()
        }
        async fn make_symlink(
            &self,
            _: &FileHandle,
            _: &vfs::FileName,
            _: &vfs::SymlinkTarget,
            _: vfs::SetAttr,
        ) -> vfs::VfsResult<vfs::CreatedNode> {
            unimplemented!()
        }
        async fn make_node(
            &self,
            _: &FileHandle,
            _: &vfs::FileName,
            _: vfs::SpecialNode,
        ) -> vfs::VfsResult<vfs::CreatedNode> {
            unimplemented!()
        }
        async fn remove(&self, _: &FileHandle, _: &vfs::FileName) -> vfs::VfsResult<vfs::RemovalResult> {
            unimplemented!()
        }
        async fn remove_dir(&self, _: &FileHandle, _: &vfs::FileName) -> vfs::VfsResult<vfs::RemovalResult> {
            unimplemented!()
        }
        async fn rename(
            &self,
            _: &FileHandle,
            _: &vfs::FileName,
            _: &FileHandle,
            _: &vfs::FileName,
        ) -> vfs::VfsResult<vfs::RenameResult> {
            unimplemented!()
        }
        async fn link(&self, _: &FileHandle, _: &FileHandle, _: &vfs::FileName) -> vfs::VfsResult<vfs::LinkResult> {
            unimplemented!()
        }
        async fn read_dir(
            &self,
            _: &FileHandle,
            _: vfs::DirectoryCookie,
            _: vfs::CookieVerifier,
            _: u32,
        ) -> vfs::VfsResult<vfs::ReadDirResult> {
            unimplemented!()
        }
        async fn read_dir_plus(
            &self,
            _: &FileHandle,
            _: vfs::DirectoryCookie,
            _: vfs::CookieVerifier,
            _: u32,
            _: u32,
        ) -> vfs::VfsResult<vfs::ReadDirPlusResult> {
            unimplemented!()
        }
        async fn fs_stat(&self, _: &FileHandle) -> vfs::VfsResult<vfs::FsStat> {
            unimplemented!()
        }
        async fn fs_info(&self, _: &FileHandle) -> vfs::VfsResult<vfs::FsInfo> {
            unimplemented!()
        }
        async fn path_conf(&self, _: &FileHandle) -> vfs::VfsResult<vfs::PathConfig> {
            unimplemented!()
        }
        async fn commit(&self, _: &FileHandle, _: u64, _: u32) -> vfs::VfsResult<vfs::CommitResult> {
            unimplemented!()
        }
        async fn root(&self) -> vfs::VfsResult<FileHandle> {
            Ok(FileHandle(vec![9, 9, 9]))
        }
    }

    fn state() -> ServerState {
        ServerState {
            handles: HandleTable::new(),
            attr_cache: Arc::new(AttrCache::new(AttrCacheConfig::default())),
            read_ahead: Arc::new(ReadAheadPool::new(ReadAheadConfig::default())),
            export: Arc::new(ExportController::new(ExportPolicy::default())),
            metrics: Arc::new(Metrics::new()),
            vfs: Arc::new(StubVfs),
            write_verifier: super::super::boot_write_verifier(),
            limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
        }
    }

    #[tokio::test]
    async fn mnt_root_allocates_a_handle() {
        let state = state();
        let path = EXPORT_PATH.to_string();
        let mut enc = Encoder::new();
        let mut buf = Encoder::new();
        buf.string(&path);
        let bytes = buf.into_bytes();
        let mut dec = Decoder::new(&bytes);
        mnt(&state, peer(), &mut dec, &mut enc).await.unwrap();
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.u32().unwrap(), 0);
        let handle = dec.opaque_var("fh", 64).unwrap();
        assert_eq!(handle.len(), 8);
    }

    #[tokio::test]
    async fn mnt_rejects_unknown_path() {
        let state = state();
        let mut enc = Encoder::new();
        let mut buf = Encoder::new();
        buf.string("/no/such/export");
        let bytes = buf.into_bytes();
        let mut dec = Decoder::new(&bytes);
        mnt(&state, peer(), &mut dec, &mut enc).await.unwrap();
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_ne!(dec.u32().unwrap(), 0);
    }
}
