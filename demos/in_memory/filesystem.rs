use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use nfs3d::vfs::{
    AccessMask, AccessResult, AttrDigest, CommitResult, CookieVerifier, CreateMode, CreatedNode,
    DirectoryCookie, DirectoryEntry, DirectoryPlusEntry, FileAttr, FileHandle, FileName, FileTime,
    FileType, FsInfo, FsProperties, FsStat, LinkResult, LookupResult, NfsError, PathConfig,
    ReadDirPlusResult, ReadDirResult, ReadResult, RemovalResult, RenameResult, SetAttr,
    SetAttrGuard, SetTime, SpecialNode, StableVerifier, SymlinkTarget, Vfs, VfsResult, WccData,
    WriteMode, WriteResult, MAX_FILE_HANDLE_LEN, MAX_NAME_LEN,
};

/// A tiny, in-memory VFS implementation used by the protocol-layer tests
/// and as a self-contained example of [`Vfs`] that doesn't touch disk.
/// File handles are the UTF-8 path itself, which keeps lookups trivial at
/// the cost of a handle that grows with path depth.
pub struct InMemoryVfs {
    state: RwLock<State>,
}

impl Default for InMemoryVfs {
    fn default() -> Self {
        Self { state: RwLock::new(State::new()) }
    }
}

impl InMemoryVfs {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_to_path(handle: &FileHandle) -> VfsResult<String> {
        if handle.0.len() > MAX_FILE_HANDLE_LEN {
            return Err(NfsError::BadHandle);
        }
        String::from_utf8(handle.0.clone()).map_err(|_| NfsError::BadHandle)
    }

    fn path_to_handle(path: &str) -> VfsResult<FileHandle> {
        if path.len() > MAX_FILE_HANDLE_LEN {
            return Err(NfsError::BadHandle);
        }
        Ok(FileHandle(path.as_bytes().to_vec()))
    }

    fn validate_name(name: &FileName) -> VfsResult<()> {
        if name.0.is_empty() || name.0.len() > MAX_NAME_LEN || name.0.contains('/') {
            return Err(NfsError::NameTooLong);
        }
        Ok(())
    }

    fn join(parent: &str, name: &FileName) -> String {
        if parent == "/" {
            format!("/{}", name.0)
        } else {
            format!("{}/{}", parent.trim_end_matches('/'), name.0)
        }
    }

    fn now() -> FileTime {
        let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        FileTime { seconds: duration.as_secs() as i64, nanos: duration.subsec_nanos() }
    }

    fn digest(attr: &FileAttr) -> AttrDigest {
        AttrDigest { size: attr.size, mtime: attr.mtime, ctime: attr.ctime }
    }

    fn default_attr(file_type: FileType, fileid: u64) -> FileAttr {
        let now = Self::now();
        FileAttr {
            file_type,
            mode: match file_type {
                FileType::Directory => 0o755,
                _ => 0o644,
            },
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            used: 0,
            device: None,
            fsid: 1,
            fileid,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn apply_attr(entry: &mut Entry, changes: &SetAttr) -> VfsResult<()> {
        let now = Self::now();
        if let Some(mode) = changes.mode {
            entry.attr.mode = mode;
        }
        if let Some(uid) = changes.uid {
            entry.attr.uid = uid;
        }
        if let Some(gid) = changes.gid {
            entry.attr.gid = gid;
        }
        if let Some(size) = changes.size {
            match &mut entry.kind {
                EntryKind::File { data } => {
                    let size_usize = size as usize;
                    if data.len() < size_usize {
                        data.resize(size_usize, 0);
                    } else {
                        data.truncate(size_usize);
                    }
                    entry.attr.size = size;
                    entry.attr.used = size;
                }
                _ => return Err(NfsError::Inval),
            }
        }
        match changes.atime {
            SetTime::DontChange => {}
            SetTime::ServerCurrent => entry.attr.atime = now,
            SetTime::ClientProvided(value) => entry.attr.atime = value,
        }
        match changes.mtime {
            SetTime::DontChange => {}
            SetTime::ServerCurrent => entry.attr.mtime = now,
            SetTime::ClientProvided(value) => entry.attr.mtime = value,
        }
        entry.attr.ctime = now;
        Ok(())
    }

    fn wcc(before: Option<&FileAttr>, after: Option<&FileAttr>) -> WccData {
        WccData { before: before.map(Self::digest), after: after.cloned() }
    }
}

struct State {
    nodes: HashMap<String, Entry>,
    next_fileid: u64,
    stable_verifier: StableVerifier,
}

impl State {
    fn new() -> Self {
        let mut state =
            State { nodes: HashMap::new(), next_fileid: 1, stable_verifier: StableVerifier([0; 8]) };
        state.insert_root();
        state
    }

    fn insert_root(&mut self) {
        let id = self.next_id();
        let attr = InMemoryVfs::default_attr(FileType::Directory, id);
        let entry = Entry { attr, kind: EntryKind::Directory { children: BTreeMap::new() }, exclusive_verifier: None };
        self.nodes.insert("/".into(), entry);
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_fileid;
        self.next_fileid += 1;
        id
    }

    fn dir_children(&self, path: &str) -> VfsResult<&BTreeMap<String, String>> {
        match self.nodes.get(path).map(|e| &e.kind) {
            Some(EntryKind::Directory { children }) => Ok(children),
            Some(_) => Err(NfsError::NotDir),
            None => Err(NfsError::Stale),
        }
    }

    fn dir_children_mut(&mut self, path: &str) -> VfsResult<&mut BTreeMap<String, String>> {
        match self.nodes.get_mut(path).map(|e| &mut e.kind) {
            Some(EntryKind::Directory { children }) => Ok(children),
            Some(_) => Err(NfsError::NotDir),
            None => Err(NfsError::Stale),
        }
    }

    /// All paths under (and including) `root`, deepest-first, used to
    /// rewrite keys when a directory is renamed.
    fn descendants(&self, root: &str) -> Vec<String> {
        let prefix = format!("{}/", root.trim_end_matches('/'));
        let mut found: Vec<String> =
            self.nodes.keys().filter(|p| p.starts_with(&prefix)).cloned().collect();
        found.sort_by_key(|p| std::cmp::Reverse(p.len()));
        found
    }
}

struct Entry {
    attr: FileAttr,
    kind: EntryKind,
    /// Verifier used to create this file via `CreateMode::Exclusive`,
    /// kept so a retransmitted CREATE with the same verifier is idempotent.
    exclusive_verifier: Option<[u8; 8]>,
}

enum EntryKind {
    Directory { children: BTreeMap<String, String> },
    File { data: Vec<u8> },
    Symlink { target: String },
}

#[async_trait]
impl Vfs for InMemoryVfs {
    async fn null(&self) -> VfsResult<()> {
        Ok(())
    }

    async fn get_attr(&self, handle: &FileHandle) -> VfsResult<FileAttr> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        state.nodes.get(&path).map(|e| e.attr.clone()).ok_or(NfsError::Stale)
    }

    async fn set_attr(&self, handle: &FileHandle, attr: SetAttr, guard: SetAttrGuard) -> VfsResult<WccData> {
        let path = Self::handle_to_path(handle)?;
        let mut state = self.state.write().await;
        let entry = state.nodes.get_mut(&path).ok_or(NfsError::Stale)?;
        let before = entry.attr.clone();
        if let SetAttrGuard::Check { ctime } = guard {
            if entry.attr.ctime != ctime {
                return Err(NfsError::NotSync);
            }
        }
        Self::apply_attr(entry, &attr)?;
        Ok(Self::wcc(Some(&before), Some(&entry.attr)))
    }

    async fn lookup(&self, parent: &FileHandle, name: &FileName) -> VfsResult<LookupResult> {
        Self::validate_name(name)?;
        let parent_path = Self::handle_to_path(parent)?;
        let state = self.state.read().await;
        let directory_attr = state.nodes.get(&parent_path).map(|e| e.attr.clone());
        let children = state.dir_children(&parent_path)?;
        let child_path = children.get(&name.0).ok_or(NfsError::NoEnt)?;
        let object_attr = state.nodes.get(child_path).ok_or(NfsError::Stale)?.attr.clone();
        Ok(LookupResult { handle: Self::path_to_handle(child_path)?, object_attr, directory_attr })
    }

    async fn access(&self, handle: &FileHandle, mask: AccessMask) -> VfsResult<AccessResult> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let attr = state.nodes.get(&path).ok_or(NfsError::Stale)?.attr.clone();
        Ok(AccessResult { granted: mask, file_attr: Some(attr) })
    }

    async fn read_link(&self, handle: &FileHandle) -> VfsResult<(SymlinkTarget, Option<FileAttr>)> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let entry = state.nodes.get(&path).ok_or(NfsError::Stale)?;
        match &entry.kind {
            EntryKind::Symlink { target } => Ok((SymlinkTarget(target.clone()), Some(entry.attr.clone()))),
            _ => Err(NfsError::Inval),
        }
    }

    async fn read(&self, handle: &FileHandle, offset: u64, count: u32) -> VfsResult<ReadResult> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let entry = state.nodes.get(&path).ok_or(NfsError::Stale)?;
        let data = match &entry.kind {
            EntryKind::File { data } => data,
            EntryKind::Directory { .. } => return Err(NfsError::IsDir),
            EntryKind::Symlink { .. } => return Err(NfsError::Inval),
        };
        let offset = offset as usize;
        let slice = if offset >= data.len() {
            &[][..]
        } else {
            let end = (offset + count as usize).min(data.len());
            &data[offset..end]
        };
        let eof = offset + slice.len() >= data.len();
        Ok(ReadResult { data: slice.to_vec(), eof, file_attr: Some(entry.attr.clone()) })
    }

    async fn write(&self, handle: &FileHandle, offset: u64, data: &[u8], mode: WriteMode) -> VfsResult<WriteResult> {
        let path = Self::handle_to_path(handle)?;
        let mut state = self.state.write().await;
        let entry = state.nodes.get_mut(&path).ok_or(NfsError::Stale)?;
        let file_data = match &mut entry.kind {
            EntryKind::File { data } => data,
            EntryKind::Directory { .. } => return Err(NfsError::IsDir),
            EntryKind::Symlink { .. } => return Err(NfsError::Inval),
        };
        let offset = offset as usize;
        let end = offset + data.len();
        if file_data.len() < end {
            file_data.resize(end, 0);
        }
        file_data[offset..end].copy_from_slice(data);
        entry.attr.size = file_data.len() as u64;
        entry.attr.used = entry.attr.size;
        let now = Self::now();
        entry.attr.mtime = now;
        entry.attr.ctime = now;
        Ok(WriteResult {
            count: data.len() as u32,
            committed: mode,
            verifier: state.stable_verifier,
            file_attr: Some(state.nodes.get(&path).unwrap().attr.clone()),
        })
    }

    async fn create(&self, parent: &FileHandle, name: &FileName, mode: CreateMode) -> VfsResult<CreatedNode> {
        Self::validate_name(name)?;
        let parent_path = Self::handle_to_path(parent)?;
        let mut state = self.state.write().await;
        let before = state.nodes.get(&parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let child_path = Self::join(&parent_path, name);

        let existing_verifier = state.nodes.get(&child_path).and_then(|e| e.exclusive_verifier);
        let set_attr = match &mode {
            CreateMode::Unchecked { attr } => Some(attr.clone()),
            CreateMode::Guarded { attr, .. } => {
                if state.nodes.contains_key(&child_path) {
                    return Err(NfsError::Exist);
                }
                Some(attr.clone())
            }
            CreateMode::Exclusive { verifier } => {
                if let Some(existing) = existing_verifier {
                    if existing == *verifier {
                        let attr = state.nodes.get(&child_path).unwrap().attr.clone();
                        return Ok(CreatedNode {
                            handle: Self::path_to_handle(&child_path)?,
                            attr,
                            directory_wcc: Self::wcc(Some(&before), Some(&before)),
                        });
                    }
                    return Err(NfsError::Exist);
                }
                if state.nodes.contains_key(&child_path) {
                    return Err(NfsError::Exist);
                }
                None
            }
        };

        let id = state.next_id();
        let mut entry = Entry {
            attr: InMemoryVfs::default_attr(FileType::Regular, id),
            kind: EntryKind::File { data: Vec::new() },
            exclusive_verifier: match &mode {
                CreateMode::Exclusive { verifier } => Some(*verifier),
                _ => None,
            },
        };
        if let Some(attr) = set_attr {
            Self::apply_attr(&mut entry, &attr)?;
        }
        let attr = entry.attr.clone();
        state.nodes.insert(child_path.clone(), entry);
        state.dir_children_mut(&parent_path)?.insert(name.0.clone(), child_path.clone());
        let after = state.nodes.get(&parent_path).unwrap().attr.clone();

        Ok(CreatedNode {
            handle: Self::path_to_handle(&child_path)?,
            attr,
            directory_wcc: Self::wcc(Some(&before), Some(&after)),
        })
    }

    async fn make_dir(&self, parent: &FileHandle, name: &FileName, attr: SetAttr) -> VfsResult<CreatedNode> {
        Self::validate_name(name)?;
        let parent_path = Self::handle_to_path(parent)?;
        let mut state = self.state.write().await;
        let before = state.nodes.get(&parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let child_path = Self::join(&parent_path, name);
        if state.nodes.contains_key(&child_path) {
            return Err(NfsError::Exist);
        }
        let id = state.next_id();
        let mut entry = Entry {
            attr: InMemoryVfs::default_attr(FileType::Directory, id),
            kind: EntryKind::Directory { children: BTreeMap::new() },
            exclusive_verifier: None,
        };
        Self::apply_attr(&mut entry, &attr)?;
        let node_attr = entry.attr.clone();
        state.nodes.insert(child_path.clone(), entry);
        state.dir_children_mut(&parent_path)?.insert(name.0.clone(), child_path.clone());
        let after = state.nodes.get(&parent_path).unwrap().attr.clone();

        Ok(CreatedNode {
            handle: Self::path_to_handle(&child_path)?,
            attr: node_attr,
            directory_wcc: Self::wcc(Some(&before), Some(&after)),
        })
    }

    async fn make_symlink(
        &self,
        parent: &FileHandle,
        name: &FileName,
        target: &SymlinkTarget,
        attr: SetAttr,
    ) -> VfsResult<CreatedNode> {
        Self::validate_name(name)?;
        let parent_path = Self::handle_to_path(parent)?;
        let mut state = self.state.write().await;
        let before = state.nodes.get(&parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let child_path = Self::join(&parent_path, name);
        if state.nodes.contains_key(&child_path) {
            return Err(NfsError::Exist);
        }
        let id = state.next_id();
        let mut entry = Entry {
            attr: InMemoryVfs::default_attr(FileType::Symlink, id),
            kind: EntryKind::Symlink { target: target.0.clone() },
            exclusive_verifier: None,
        };
        Self::apply_attr(&mut entry, &attr)?;
        let node_attr = entry.attr.clone();
        state.nodes.insert(child_path.clone(), entry);
        state.dir_children_mut(&parent_path)?.insert(name.0.clone(), child_path.clone());
        let after = state.nodes.get(&parent_path).unwrap().attr.clone();

        Ok(CreatedNode {
            handle: Self::path_to_handle(&child_path)?,
            attr: node_attr,
            directory_wcc: Self::wcc(Some(&before), Some(&after)),
        })
    }

    async fn make_node(&self, _parent: &FileHandle, _name: &FileName, _node: SpecialNode) -> VfsResult<CreatedNode> {
        Err(NfsError::NotSupp)
    }

    async fn remove(&self, parent: &FileHandle, name: &FileName) -> VfsResult<RemovalResult> {
        let parent_path = Self::handle_to_path(parent)?;
        let mut state = self.state.write().await;
        let before = state.nodes.get(&parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let child_path = state.dir_children(&parent_path)?.get(&name.0).cloned().ok_or(NfsError::NoEnt)?;
        match state.nodes.get(&child_path).map(|e| &e.kind) {
            Some(EntryKind::Directory { .. }) => return Err(NfsError::IsDir),
            None => return Err(NfsError::Stale),
            _ => {}
        }
        state.nodes.remove(&child_path);
        state.dir_children_mut(&parent_path)?.remove(&name.0);
        let after = state.nodes.get(&parent_path).unwrap().attr.clone();
        Ok(RemovalResult { directory_wcc: Self::wcc(Some(&before), Some(&after)) })
    }

    async fn remove_dir(&self, parent: &FileHandle, name: &FileName) -> VfsResult<RemovalResult> {
        let parent_path = Self::handle_to_path(parent)?;
        let mut state = self.state.write().await;
        let before = state.nodes.get(&parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let child_path = state.dir_children(&parent_path)?.get(&name.0).cloned().ok_or(NfsError::NoEnt)?;
        match state.nodes.get(&child_path).map(|e| &e.kind) {
            Some(EntryKind::Directory { children }) if !children.is_empty() => return Err(NfsError::NotEmpty),
            Some(EntryKind::Directory { .. }) => {}
            None => return Err(NfsError::Stale),
            _ => return Err(NfsError::NotDir),
        }
        state.nodes.remove(&child_path);
        state.dir_children_mut(&parent_path)?.remove(&name.0);
        let after = state.nodes.get(&parent_path).unwrap().attr.clone();
        Ok(RemovalResult { directory_wcc: Self::wcc(Some(&before), Some(&after)) })
    }

    async fn rename(
        &self,
        from_parent: &FileHandle,
        from_name: &FileName,
        to_parent: &FileHandle,
        to_name: &FileName,
    ) -> VfsResult<RenameResult> {
        Self::validate_name(from_name)?;
        Self::validate_name(to_name)?;
        let from_parent_path = Self::handle_to_path(from_parent)?;
        let to_parent_path = Self::handle_to_path(to_parent)?;
        let mut state = self.state.write().await;

        let from_before = state.nodes.get(&from_parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let to_before = state.nodes.get(&to_parent_path).ok_or(NfsError::Stale)?.attr.clone();
        let old_path =
            state.dir_children(&from_parent_path)?.get(&from_name.0).cloned().ok_or(NfsError::NoEnt)?;
        let new_path = Self::join(&to_parent_path, to_name);
        if old_path == new_path {
            let from_after = state.nodes.get(&from_parent_path).unwrap().attr.clone();
            let to_after = state.nodes.get(&to_parent_path).unwrap().attr.clone();
            return Ok(RenameResult {
                from_directory_wcc: Self::wcc(Some(&from_before), Some(&from_after)),
                to_directory_wcc: Self::wcc(Some(&to_before), Some(&to_after)),
            });
        }
        if state.nodes.contains_key(&new_path) {
            match state.nodes.get(&new_path).map(|e| &e.kind) {
                Some(EntryKind::Directory { children }) if children.is_empty() => {
                    state.nodes.remove(&new_path);
                }
                _ => return Err(NfsError::Exist),
            }
        }

        let descendants = state.descendants(&old_path);
        for old_desc in descendants {
            let suffix = &old_desc[old_path.len()..];
            let new_desc = format!("{new_path}{suffix}");
            if let Some(entry) = state.nodes.remove(&old_desc) {
                state.nodes.insert(new_desc.clone(), entry);
            }
            if let Some(entry) = state.nodes.get_mut(&new_desc) {
                if let EntryKind::Directory { children } = &mut entry.kind {
                    let updated: BTreeMap<String, String> = children
                        .iter()
                        .map(|(name, path)| (name.clone(), format!("{new_path}{}", &path[old_path.len()..])))
                        .collect();
                    *children = updated;
                }
            }
        }
        if let Some(entry) = state.nodes.remove(&old_path) {
            state.nodes.insert(new_path.clone(), entry);
        }

        state.dir_children_mut(&from_parent_path)?.remove(&from_name.0);
        state.dir_children_mut(&to_parent_path)?.insert(to_name.0.clone(), new_path);

        let from_after = state.nodes.get(&from_parent_path).unwrap().attr.clone();
        let to_after = state.nodes.get(&to_parent_path).unwrap().attr.clone();
        Ok(RenameResult {
            from_directory_wcc: Self::wcc(Some(&from_before), Some(&from_after)),
            to_directory_wcc: Self::wcc(Some(&to_before), Some(&to_after)),
        })
    }

    async fn link(&self, _source: &FileHandle, _new_parent: &FileHandle, _new_name: &FileName) -> VfsResult<LinkResult> {
        // Hard links would require a path to resolve to more than one name,
        // which the path-as-handle model here can't express.
        Err(NfsError::NotSupp)
    }

    async fn read_dir(
        &self,
        handle: &FileHandle,
        cookie: DirectoryCookie,
        verifier: CookieVerifier,
        max_bytes: u32,
    ) -> VfsResult<ReadDirResult> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let directory_attr = state.nodes.get(&path).map(|e| e.attr.clone());
        let children = state.dir_children(&path)?;
        if cookie.0 != 0 && verifier != state.cookie_verifier() {
            return Err(NfsError::BadCookie);
        }
        let max_entries = (max_bytes.max(64) / 64) as usize;
        let mut entries = Vec::new();
        for (idx, (name, child_path)) in children.iter().enumerate() {
            let entry_cookie = (idx + 1) as u64;
            if entry_cookie <= cookie.0 {
                continue;
            }
            let fileid = state.nodes.get(child_path).map(|e| e.attr.fileid).unwrap_or(0);
            entries.push(DirectoryEntry { cookie: DirectoryCookie(entry_cookie), name: FileName(name.clone()), fileid });
            if entries.len() >= max_entries {
                break;
            }
        }
        let eof = cookie.0 as usize + entries.len() >= children.len();
        Ok(ReadDirResult { directory_attr, cookie_verifier: state.cookie_verifier(), entries, eof })
    }

    async fn read_dir_plus(
        &self,
        handle: &FileHandle,
        cookie: DirectoryCookie,
        verifier: CookieVerifier,
        max_bytes: u32,
        _max_handles: u32,
    ) -> VfsResult<ReadDirPlusResult> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let directory_attr = state.nodes.get(&path).map(|e| e.attr.clone());
        let children = state.dir_children(&path)?;
        if cookie.0 != 0 && verifier != state.cookie_verifier() {
            return Err(NfsError::BadCookie);
        }
        let max_entries = (max_bytes.max(128) / 128) as usize;
        let mut entries = Vec::new();
        for (idx, (name, child_path)) in children.iter().enumerate() {
            let entry_cookie = (idx + 1) as u64;
            if entry_cookie <= cookie.0 {
                continue;
            }
            let attr = state.nodes.get(child_path).map(|e| e.attr.clone());
            let fileid = attr.as_ref().map(|a| a.fileid).unwrap_or(0);
            entries.push(DirectoryPlusEntry {
                cookie: DirectoryCookie(entry_cookie),
                name: FileName(name.clone()),
                fileid,
                handle: Self::path_to_handle(child_path).ok(),
                attr,
            });
            if entries.len() >= max_entries {
                break;
            }
        }
        let eof = cookie.0 as usize + entries.len() >= children.len();
        Ok(ReadDirPlusResult { directory_attr, cookie_verifier: state.cookie_verifier(), entries, eof })
    }

    async fn fs_stat(&self, handle: &FileHandle) -> VfsResult<FsStat> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let file_attr = state.nodes.get(&path).map(|e| e.attr.clone());
        Ok(FsStat {
            total_bytes: u64::MAX,
            free_bytes: u64::MAX,
            available_bytes: u64::MAX,
            total_files: u64::MAX,
            free_files: u64::MAX,
            available_files: u64::MAX,
            invarsec: 0,
            file_attr,
        })
    }

    async fn fs_info(&self, handle: &FileHandle) -> VfsResult<FsInfo> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let file_attr = state.nodes.get(&path).map(|e| e.attr.clone());
        Ok(FsInfo {
            read_max: 1 << 20,
            read_pref: 1 << 16,
            read_multiple: 4096,
            write_max: 1 << 20,
            write_pref: 1 << 16,
            write_multiple: 4096,
            directory_pref: 1 << 16,
            max_file_size: u64::MAX,
            time_delta: FileTime { seconds: 0, nanos: 1 },
            properties: FsProperties::HOMOGENEOUS | FsProperties::CAN_SET_TIME | FsProperties::SYMLINK,
            file_attr,
        })
    }

    async fn path_conf(&self, handle: &FileHandle) -> VfsResult<PathConfig> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let file_attr = state.nodes.get(&path).map(|e| e.attr.clone());
        Ok(PathConfig {
            file_attr,
            max_link: 1,
            max_name: MAX_NAME_LEN as u32,
            no_trunc: true,
            chown_restricted: false,
            case_insensitive: false,
            case_preserving: true,
        })
    }

    async fn commit(&self, handle: &FileHandle, _offset: u64, _count: u32) -> VfsResult<CommitResult> {
        let path = Self::handle_to_path(handle)?;
        let state = self.state.read().await;
        let file_attr = state.nodes.get(&path).map(|e| e.attr.clone());
        Ok(CommitResult { file_attr, verifier: state.stable_verifier })
    }

    async fn root(&self) -> VfsResult<FileHandle> {
        Self::path_to_handle("/")
    }
}

impl State {
    fn cookie_verifier(&self) -> CookieVerifier {
        CookieVerifier(self.stable_verifier.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> FileName {
        FileName(s.to_string())
    }

    fn empty_attr() -> SetAttr {
        SetAttr { mode: None, uid: None, gid: None, size: None, atime: SetTime::DontChange, mtime: SetTime::DontChange }
    }

    #[tokio::test]
    async fn create_write_read_round_trip() {
        let vfs = InMemoryVfs::new();
        let root = vfs.root().await.unwrap();
        let created = vfs
            .create(&root, &name("a.txt"), CreateMode::Unchecked { attr: empty_attr() })
            .await
            .unwrap();
        vfs.write(&created.handle, 0, b"hello", WriteMode::FileSync).await.unwrap();
        let read = vfs.read(&created.handle, 0, 5).await.unwrap();
        assert_eq!(read.data, b"hello");
        assert!(read.eof);
    }

    #[tokio::test]
    async fn mkdir_then_lookup() {
        let vfs = InMemoryVfs::new();
        let root = vfs.root().await.unwrap();
        let dir = vfs.make_dir(&root, &name("sub"), empty_attr()).await.unwrap();
        assert_eq!(dir.attr.file_type, FileType::Directory);
        let looked_up = vfs.lookup(&root, &name("sub")).await.unwrap();
        assert_eq!(looked_up.handle, dir.handle);
    }

    #[tokio::test]
    async fn remove_dir_rejects_non_empty() {
        let vfs = InMemoryVfs::new();
        let root = vfs.root().await.unwrap();
        vfs.make_dir(&root, &name("sub"), empty_attr()).await.unwrap();
        let sub = vfs.lookup(&root, &name("sub")).await.unwrap().handle;
        vfs.create(&sub, &name("f"), CreateMode::Unchecked { attr: empty_attr() }).await.unwrap();
        let err = vfs.remove_dir(&root, &name("sub")).await.unwrap_err();
        assert_eq!(err, NfsError::NotEmpty);
    }

    #[tokio::test]
    async fn rename_moves_directory_and_descendants() {
        let vfs = InMemoryVfs::new();
        let root = vfs.root().await.unwrap();
        vfs.make_dir(&root, &name("a"), empty_attr()).await.unwrap();
        vfs.make_dir(&root, &name("b"), empty_attr()).await.unwrap();
        let a = vfs.lookup(&root, &name("a")).await.unwrap().handle;
        vfs.create(&a, &name("f"), CreateMode::Unchecked { attr: empty_attr() }).await.unwrap();

        vfs.rename(&root, &name("a"), &root, &name("c")).await.unwrap();
        let err = vfs.lookup(&root, &name("a")).await.unwrap_err();
        assert_eq!(err, NfsError::NoEnt);
        let c = vfs.lookup(&root, &name("c")).await.unwrap().handle;
        let inner = vfs.lookup(&c, &name("f")).await.unwrap();
        assert_eq!(inner.object_attr.file_type, FileType::Regular);
    }

    #[tokio::test]
    async fn setattr_guard_rejects_stale_ctime() {
        let vfs = InMemoryVfs::new();
        let root = vfs.root().await.unwrap();
        let created = vfs
            .create(&root, &name("g.txt"), CreateMode::Unchecked { attr: empty_attr() })
            .await
            .unwrap();
        let stale_ctime = FileTime { seconds: 1, nanos: 0 };
        let err = vfs
            .set_attr(&created.handle, empty_attr(), SetAttrGuard::Check { ctime: stale_ctime })
            .await
            .unwrap_err();
        assert_eq!(err, NfsError::NotSync);
    }
}
