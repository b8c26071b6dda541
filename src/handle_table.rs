//! Dense handle table mapping 64-bit wire handles to file objects.
//!
//! Handle 0 is reserved and never allocated. Freed ids are reused smallest
//! first via a min-heap, so a long-running server does not grow the handle
//! space without bound under churn.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::vfs::FileHandle;

/// A live file object bound to a wire handle.
///
/// Owns the backing file system's own opaque handle plus the path
/// components needed for weak-cache-consistency bookkeeping and directory
/// invalidation.
#[derive(Debug, Clone)]
pub struct FileObject {
    pub backing: FileHandle,
    pub path: PathBuf,
    pub is_directory: bool,
    /// Client the handle was allocated for, used to release its §4.6
    /// live-handle reservation when the handle is dropped.
    pub owner: IpAddr,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<u64, FileObject>,
    by_path: HashMap<PathBuf, u64>,
    next: u64,
    freed: BinaryHeap<Reverse<u64>>,
}

impl Inner {
    fn new() -> Self {
        Inner { objects: HashMap::new(), by_path: HashMap::new(), next: 1, freed: BinaryHeap::new() }
    }
}

/// Concurrency-safe handle table, guarded by a single readers-writer lock
/// (reads are the common case: every procedure resolves a handle).
pub struct HandleTable {
    inner: RwLock<Inner>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable { inner: RwLock::new(Inner::new()) }
    }

    /// Allocates a new wire handle for `object`, reusing the smallest freed
    /// id if one is available.
    pub fn allocate(&self, object: FileObject) -> u64 {
        let mut inner = self.inner.write().unwrap();
        let handle = match inner.freed.pop() {
            Some(Reverse(h)) => h,
            None => {
                let h = inner.next;
                inner.next += 1;
                h
            }
        };
        inner.by_path.insert(object.path.clone(), handle);
        inner.objects.insert(handle, object);
        handle
    }

    /// Returns the existing wire handle bound to `path`, if any resolved
    /// object currently lives there. LOOKUP uses this so that repeated
    /// resolution of the same path keeps returning the same handle instead
    /// of growing the table without bound.
    pub fn lookup_by_path(&self, path: &std::path::Path) -> Option<u64> {
        self.inner.read().unwrap().by_path.get(path).copied()
    }

    /// Allocates a handle for `object`, reusing one already bound to its
    /// path instead of minting a new id.
    pub fn allocate_or_reuse(&self, object: FileObject) -> u64 {
        if let Some(handle) = self.lookup_by_path(&object.path) {
            return handle;
        }
        self.allocate(object)
    }

    pub fn get(&self, handle: u64) -> Option<FileObject> {
        self.inner.read().unwrap().objects.get(&handle).cloned()
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.inner.read().unwrap().objects.contains_key(&handle)
    }

    /// Releases `handle`, returning the object it pointed to (if still live).
    pub fn release(&self, handle: u64) -> Option<FileObject> {
        if handle == 0 {
            return None;
        }
        let mut inner = self.inner.write().unwrap();
        let removed = inner.objects.remove(&handle);
        if let Some(object) = &removed {
            inner.by_path.remove(&object.path);
            inner.freed.push(Reverse(handle));
        }
        removed
    }

    /// Releases whatever object is bound to `path`, if any (REMOVE/RMDIR).
    /// Returns the released object so the caller can undo its bookkeeping
    /// (e.g. a live-handle reservation).
    pub fn release_path(&self, path: &std::path::Path) -> Option<FileObject> {
        let handle = self.lookup_by_path(path)?;
        self.release(handle)
    }

    /// Rebinds the object at `old_path`, if any, to `new_path` (RENAME).
    /// Any handle already resident at `new_path` is released first, since
    /// the rename overwrites whatever used to live there. Returns the
    /// evicted object, if any, so the caller can undo its bookkeeping.
    pub fn rename_path(&self, old_path: &std::path::Path, new_path: &std::path::Path) -> Option<FileObject> {
        let mut inner = self.inner.write().unwrap();
        let evicted = if let Some(stale) = inner.by_path.remove(new_path) {
            let object = inner.objects.remove(&stale);
            inner.freed.push(Reverse(stale));
            object
        } else {
            None
        };
        if let Some(handle) = inner.by_path.remove(old_path) {
            if let Some(object) = inner.objects.get_mut(&handle) {
                object.path = new_path.to_path_buf();
            }
            inner.by_path.insert(new_path.to_path_buf(), handle);
        }
        evicted
    }

    /// Drops every live object, resetting the table to its initial state.
    /// Used during server shutdown.
    pub fn release_all(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.objects.clear();
        inner.by_path.clear();
        inner.freed.clear();
        inner.next = 1;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
