//! Procedure dispatchers: NFSv3 (C10) and MOUNT v3 (C11).
//!
//! Both dispatchers share a [`ServerState`] — the process-wide singletons a
//! procedure handler needs to resolve handles, consult caches, and invoke
//! the backing file system.

pub mod mount;
pub mod nfs3;

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{AttrCache, ReadAheadPool};
use crate::export::ExportController;
use crate::handle_table::{FileObject, HandleTable};
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;
use crate::vfs::{FileHandle, NfsError, Vfs};

/// Process-boot write verifier (§9 open question: "emit a
/// process-boot-time constant"). Stable for the lifetime of the server;
/// a restart changes it, which correctly tells clients to re-issue any
/// unstable writes via COMMIT.
pub fn boot_write_verifier() -> [u8; 8] {
    static VERIFIER: std::sync::OnceLock<[u8; 8]> = std::sync::OnceLock::new();
    *VERIFIER.get_or_init(|| {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        nanos.to_be_bytes()
    })
}

pub struct ServerState {
    pub handles: HandleTable,
    pub attr_cache: Arc<AttrCache>,
    pub read_ahead: Arc<ReadAheadPool>,
    pub export: Arc<ExportController>,
    pub metrics: Arc<Metrics>,
    pub vfs: Arc<dyn Vfs>,
    pub write_verifier: [u8; 8],
    pub limiter: Arc<RateLimiter>,
}

impl ServerState {
    /// Resolves a wire handle to its backing file object. A handle absent
    /// from the table is always `NFSERR_STALE` — the table is process-local
    /// and dense, so an attacker-chosen id simply never appears in it.
    pub fn resolve(&self, handle_id: u64) -> Result<FileObject, NfsError> {
        self.handles.get(handle_id).ok_or(NfsError::Stale)
    }

    /// Decodes a wire `fhandle3` and resolves it in one step.
    pub fn resolve_wire(&self, handle: &FileHandle) -> Result<FileObject, NfsError> {
        self.resolve(Self::decode_handle_id(handle)?)
    }

    pub fn decode_handle_id(handle: &FileHandle) -> Result<u64, NfsError> {
        let bytes: [u8; 8] = handle.0.as_slice().try_into().map_err(|_| NfsError::BadHandle)?;
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn encode_handle_id(id: u64) -> FileHandle {
        FileHandle(id.to_be_bytes().to_vec())
    }

    /// Binds `child_path` to `backing` in the handle table (reusing an
    /// existing handle for that path if one is already live) and returns
    /// the wire handle clients should see. A path already bound reuses its
    /// handle for free; a genuinely new handle consults the per-IP/global
    /// live-handle ceilings (§4.6) and fails with `NFSERR_DELAY` if either
    /// is exhausted.
    pub fn bind_child(&self, peer: IpAddr, child_path: PathBuf, backing: FileHandle, is_directory: bool) -> Result<FileHandle, NfsError> {
        if let Some(id) = self.handles.lookup_by_path(&child_path) {
            return Ok(Self::encode_handle_id(id));
        }
        if !self.limiter.try_reserve_handle(peer) {
            return Err(NfsError::Delay);
        }
        let id = self.handles.allocate(FileObject { backing, path: child_path, is_directory, owner: peer });
        Ok(Self::encode_handle_id(id))
    }

    /// Invalidates every cache entry keyed on `path`, as required before a
    /// write-class operation's success reply is emitted.
    pub fn invalidate_path(&self, path: &Path) {
        self.attr_cache.invalidate(path);
        self.read_ahead.purge(path);
    }

    pub fn invalidate_negatives_under(&self, dir: &Path) {
        self.attr_cache.invalidate_negatives_under(dir);
    }

    /// Forgets a removed path entirely: drops its handle-table entry and
    /// marks it negatively cached so a subsequent LOOKUP short-circuits.
    pub fn forget_path(&self, path: &Path) {
        if let Some(object) = self.handles.release_path(path) {
            self.limiter.release_handle(object.owner);
        }
        self.invalidate_path(path);
        self.attr_cache.put_negative(path.to_path_buf());
    }

    /// Rebinds the handle at `old_path` to `new_path` (RENAME), releasing
    /// the live-handle reservation of whatever handle used to occupy
    /// `new_path`.
    pub fn rename_path(&self, old_path: &Path, new_path: &Path) {
        if let Some(evicted) = self.handles.rename_path(old_path, new_path) {
            self.limiter.release_handle(evicted.owner);
        }
    }

    pub fn child_path(parent: &Path, name: &str) -> PathBuf {
        parent.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AttrCache, AttrCacheConfig, ReadAheadConfig, ReadAheadPool};
    use crate::export::{ExportController, ExportPolicy};
    use crate::metrics::Metrics;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::vfs::{self as vfs_mod, FileName};
    use std::net::{IpAddr, Ipv4Addr};

    fn peer() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    /// Stands in for a backing file system in tests that only exercise
    /// handle-table/rate-limiter bookkeeping, never an actual VFS call.
    struct NullVfs;

    #[async_trait::async_trait]
    impl Vfs for NullVfs {
        async fn null(&self) -> vfs_mod::VfsResult<()> {
            unimplemented!()
        }
        async fn get_attr(&self, _: &FileHandle) -> vfs_mod::VfsResult<vfs_mod::FileAttr> {
            unimplemented!()
        }
        async fn set_attr(
            &self,
            _: &FileHandle,
            _: vfs_mod::SetAttr,
            _: Option<vfs_mod::SetAttrGuard>,
        ) -> vfs_mod::VfsResult<vfs_mod::WccData> {
            unimplemented!()
        }
        async fn lookup(&self, _: &FileHandle, _: &FileName) -> vfs_mod::VfsResult<vfs_mod::LookupResult> {
            unimplemented!()
        }
        async fn access(&self, _: &FileHandle, _: vfs_mod::AccessMask) -> vfs_mod::VfsResult<vfs_mod::AccessResult> {
            unimplemented!()
        }
        async fn read_link(&self, _: &FileHandle) -> vfs_mod::VfsResult<(vfs_mod::SymlinkTarget, Option<vfs_mod::FileAttr>)> {
            unimplemented!()
        }
        async fn read(&self, _: &FileHandle, _: u64, _: u32) -> vfs_mod::VfsResult<vfs_mod::ReadResult> {
            unimplemented!()
        }
        async fn write(&self, _: &FileHandle, _: u64, _: &[u8], _: vfs_mod::WriteMode) -> vfs_mod::VfsResult<vfs_mod::WriteResult> {
            unimplemented!()
        }
        async fn create(
            &self,
            _: &FileHandle,
            _: &FileName,
            _: vfs_mod::CreateMode,
        ) -> vfs_mod::VfsResult<vfs_mod::CreatedNode> {
            unimplemented!()
        }
        async fn make_dir(&self, _: &FileHandle, _: &FileName, _: vfs_mod::SetAttr) -> vfs_mod::VfsResult<vfs_mod::CreatedNode> {
            unimplemented!()
        }
        async fn make_symlink(
            &self,
            _: &FileHandle,
            _: &FileName,
            _: &vfs_mod::SymlinkTarget,
            _: vfs_mod::SetAttr,
        ) -> vfs_mod::VfsResult<vfs_mod::CreatedNode> {
            unimplemented!()
        }
        async fn make_node(
            &self,
            _: &FileHandle,
            _: &FileName,
            _: vfs_mod::SpecialNode,
        ) -> vfs_mod::VfsResult<vfs_mod::CreatedNode> {
            unimplemented!()
        }
        async fn remove(&self, _: &FileHandle, _: &FileName) -> vfs_mod::VfsResult<vfs_mod::RemovalResult> {
            unimplemented!()
        }
        async fn remove_dir(&self, _: &FileHandle, _: &FileName) -> vfs_mod::VfsResult<vfs_mod::RemovalResult> {
            unimplemented!()
        }
        async fn rename(
            &self,
            _: &FileHandle,
            _: &FileName,
            _: &FileHandle,
            _: &FileName,
        ) -> vfs_mod::VfsResult<vfs_mod::RenameResult> {
            unimplemented!()
        }
        async fn link(&self, _: &FileHandle, _: &FileHandle, _: &FileName) -> vfs_mod::VfsResult<vfs_mod::LinkResult> {
            unimplemented!()
        }
        async fn read_dir(
            &self,
            _: &FileHandle,
            _: vfs_mod::DirectoryCookie,
            _: vfs_mod::CookieVerifier,
            _: u32,
        ) -> vfs_mod::VfsResult<vfs_mod::ReadDirResult> {
            unimplemented!()
        }
        async fn read_dir_plus(
            &self,
            _: &FileHandle,
            _: vfs_mod::DirectoryCookie,
            _: vfs_mod::CookieVerifier,
            _: u32,
            _: u32,
        ) -> vfs_mod::VfsResult<vfs_mod::ReadDirPlusResult> {
            unimplemented!()
        }
        async fn fs_stat(&self, _: &FileHandle) -> vfs_mod::VfsResult<vfs_mod::FsStat> {
            unimplemented!()
        }
        async fn fs_info(&self, _: &FileHandle) -> vfs_mod::VfsResult<vfs_mod::FsInfo> {
            unimplemented!()
        }
        async fn path_conf(&self, _: &FileHandle) -> vfs_mod::VfsResult<vfs_mod::PathConfig> {
            unimplemented!()
        }
        async fn commit(&self, _: &FileHandle, _: u64, _: u32) -> vfs_mod::VfsResult<vfs_mod::CommitResult> {
            unimplemented!()
        }
        async fn root(&self) -> vfs_mod::VfsResult<FileHandle> {
            unimplemented!()
        }
    }

    fn state_with(limiter: RateLimiter) -> ServerState {
        ServerState {
            handles: HandleTable::new(),
            attr_cache: Arc::new(AttrCache::new(AttrCacheConfig::default())),
            read_ahead: Arc::new(ReadAheadPool::new(ReadAheadConfig::default())),
            export: Arc::new(ExportController::new(ExportPolicy::default())),
            metrics: Arc::new(Metrics::new()),
            vfs: Arc::new(NullVfs),
            write_verifier: boot_write_verifier(),
            limiter: Arc::new(limiter),
        }
    }

    #[test]
    fn bind_child_respects_the_per_ip_handle_ceiling() {
        let limiter = RateLimiter::new(RateLimitConfig { file_handles_per_ip: 1, ..RateLimitConfig::default() });
        let state = state_with(limiter);
        let backing = |n: u8| FileHandle(vec![n]);
        state.bind_child(peer(), PathBuf::from("/a"), backing(1), false).expect("first handle fits the ceiling");
        let err = state.bind_child(peer(), PathBuf::from("/b"), backing(2), false).unwrap_err();
        assert_eq!(err, NfsError::Delay);
    }

    #[test]
    fn bind_child_reusing_a_path_does_not_spend_a_second_reservation() {
        let limiter = RateLimiter::new(RateLimitConfig { file_handles_per_ip: 1, ..RateLimitConfig::default() });
        let state = state_with(limiter);
        let backing = FileHandle(vec![1]);
        let first = state.bind_child(peer(), PathBuf::from("/a"), backing.clone(), false).unwrap();
        let second = state.bind_child(peer(), PathBuf::from("/a"), backing, false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn forget_path_releases_the_handle_reservation() {
        let limiter = RateLimiter::new(RateLimitConfig { file_handles_per_ip: 1, ..RateLimitConfig::default() });
        let state = state_with(limiter);
        state.bind_child(peer(), PathBuf::from("/a"), FileHandle(vec![1]), false).unwrap();
        state.forget_path(Path::new("/a"));
        state
            .bind_child(peer(), PathBuf::from("/b"), FileHandle(vec![2]), false)
            .expect("releasing /a should free its reservation for /b");
    }
}
