//! Per-path read-ahead window pool bounded by file count and total memory
//! (C5). Eviction order must be exact LRU under two simultaneous caps, which
//! `moka`'s weigher model does not express directly, so this is a small
//! hand-rolled structure guarded by a single mutex.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Window {
    pub base_offset: u64,
    pub data: Vec<u8>,
}

impl Window {
    fn covers(&self, offset: u64, count: u32) -> bool {
        let end = offset.saturating_add(count as u64);
        offset >= self.base_offset && end <= self.base_offset + self.data.len() as u64
    }

    fn slice(&self, offset: u64, count: u32) -> Vec<u8> {
        let start = (offset - self.base_offset) as usize;
        let end = start + count as usize;
        self.data[start..end].to_vec()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadAheadConfig {
    pub enabled: bool,
    pub window_size: u32,
    pub max_files: usize,
    pub max_memory: u64,
}

impl Default for ReadAheadConfig {
    fn default() -> Self {
        ReadAheadConfig { enabled: true, window_size: 128 * 1024, max_files: 256, max_memory: 64 * 1024 * 1024 }
    }
}

struct State {
    windows: HashMap<PathBuf, Window>,
    order: VecDeque<PathBuf>,
    memory_used: u64,
}

pub struct ReadAheadPool {
    config: ReadAheadConfig,
    state: Mutex<State>,
}

impl ReadAheadPool {
    pub fn new(config: ReadAheadConfig) -> Self {
        ReadAheadPool {
            config,
            state: Mutex::new(State { windows: HashMap::new(), order: VecDeque::new(), memory_used: 0 }),
        }
    }

    /// Returns the requested bytes if a window already covers the range.
    pub fn read(&self, path: &Path, offset: u64, count: u32) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }
        let mut state = self.state.lock().unwrap();
        let hit = state.windows.get(path).filter(|w| w.covers(offset, count)).map(|w| w.slice(offset, count));
        if hit.is_some() {
            touch(&mut state.order, path);
        }
        hit
    }

    /// Populates a window starting at `offset` with up to `window_size`
    /// bytes, evicting LRU entries as needed to respect both caps.
    pub fn populate(&self, path: PathBuf, offset: u64, data: Vec<u8>) {
        if !self.config.enabled || data.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(old) = state.windows.remove(&path) {
            state.memory_used -= old.data.len() as u64;
        }
        let len = data.len() as u64;
        state.windows.insert(path.clone(), Window { base_offset: offset, data });
        state.memory_used += len;
        touch(&mut state.order, &path);
        self.evict_if_needed(&mut state);
    }

    /// Removes any window covering `path`; called on every write-class
    /// operation (write, truncate, chmod, chown, remove, rename).
    pub fn purge(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        if let Some(old) = state.windows.remove(path) {
            state.memory_used -= old.data.len() as u64;
        }
    }

    fn evict_if_needed(&self, state: &mut State) {
        while state.windows.len() > self.config.max_files || state.memory_used > self.config.max_memory {
            let Some(candidate) = state.order.pop_front() else { break };
            if let Some(window) = state.windows.remove(&candidate) {
                state.memory_used -= window.data.len() as u64;
            }
        }
    }

    /// Evicts LRU windows until usage is at or below `target_bytes`, without
    /// permanently lowering the configured cap. Used under memory pressure.
    pub fn shrink_to(&self, target_bytes: u64) {
        let mut state = self.state.lock().unwrap();
        while state.memory_used > target_bytes {
            let Some(candidate) = state.order.pop_front() else { break };
            if let Some(window) = state.windows.remove(&candidate) {
                state.memory_used -= window.data.len() as u64;
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().windows.len()
    }

    pub fn memory_used(&self) -> u64 {
        self.state.lock().unwrap().memory_used
    }
}

fn touch(order: &mut VecDeque<PathBuf>, path: &Path) {
    if let Some(pos) = order.iter().position(|p| p == path) {
        order.remove(pos);
    }
    order.push_back(path.to_path_buf());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_bytes_without_recomputing() {
        let pool = ReadAheadPool::new(ReadAheadConfig::default());
        let path = PathBuf::from("/a");
        pool.populate(path.clone(), 0, vec![1, 2, 3, 4]);
        assert_eq!(pool.read(&path, 1, 2), Some(vec![2, 3]));
    }

    #[test]
    fn miss_outside_window() {
        let pool = ReadAheadPool::new(ReadAheadConfig::default());
        let path = PathBuf::from("/a");
        pool.populate(path.clone(), 0, vec![1, 2, 3, 4]);
        assert_eq!(pool.read(&path, 10, 2), None);
    }

    #[test]
    fn write_purges_window() {
        let pool = ReadAheadPool::new(ReadAheadConfig::default());
        let path = PathBuf::from("/a");
        pool.populate(path.clone(), 0, vec![1, 2, 3, 4]);
        pool.purge(&path);
        assert_eq!(pool.read(&path, 0, 2), None);
    }

    #[test]
    fn evicts_lru_when_file_cap_exceeded() {
        let config = ReadAheadConfig { max_files: 1, ..ReadAheadConfig::default() };
        let pool = ReadAheadPool::new(config);
        pool.populate(PathBuf::from("/a"), 0, vec![1, 2]);
        pool.populate(PathBuf::from("/b"), 0, vec![3, 4]);
        assert_eq!(pool.file_count(), 1);
        assert_eq!(pool.read(&PathBuf::from("/a"), 0, 1), None);
    }

    #[test]
    fn shrink_to_evicts_oldest_first() {
        let pool = ReadAheadPool::new(ReadAheadConfig::default());
        pool.populate(PathBuf::from("/a"), 0, vec![1, 2]);
        pool.populate(PathBuf::from("/b"), 0, vec![3, 4]);
        pool.shrink_to(2);
        assert_eq!(pool.memory_used(), 2);
        assert_eq!(pool.read(&PathBuf::from("/a"), 0, 1), None);
        assert_eq!(pool.read(&PathBuf::from("/b"), 0, 1), Some(vec![3]));
    }
}
