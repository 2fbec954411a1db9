//! Request-scoped cache of per-project results, invalidated when any file
//! under the project changes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;
use walkdir::WalkDir;

use crate::analyze::filesystem::SKIP_DIRS;
use crate::config::MAX_FILE_BYTES;
use crate::errors::{TandemError, TandemResult};

/// Entries a single run keeps before evicting the least recently used.
pub const DEFAULT_CACHE_ENTRIES: usize = 32;

/// Relative, slash-separated path -> content fingerprint.
pub type TreeSnapshot = BTreeMap<String, u32>;

struct CacheEntry<V> {
    snapshot: TreeSnapshot,
    value: V,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Result of [`AnalysisCache::get_or_load`].
#[derive(Clone, Debug)]
pub struct Lookup<V> {
    pub value: V,
    /// `true` when the loader ran.
    pub fresh: bool,
    /// Files added, modified or removed since the cached snapshot, sorted.
    /// Every file counts as added when nothing was cached.
    pub changed: Vec<String>,
}

pub struct AnalysisCache<V> {
    max_entries: usize,
    entries: Mutex<IndexMap<PathBuf, CacheEntry<V>>>,
    stats: Mutex<CacheStats>,
}

impl<V: Clone> Default for AnalysisCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ENTRIES)
    }
}

fn is_skipped(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// CRC32 of the file's bytes. Oversized files hash their size and mtime
/// instead of being read.
fn file_fingerprint(path: &Path, metadata: &std::fs::Metadata) -> TandemResult<u32> {
    if metadata.len() <= MAX_FILE_BYTES {
        return Ok(crc32fast::hash(&std::fs::read(path)?));
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&metadata.len().to_le_bytes());
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    hasher.update(&mtime.to_le_bytes());
    Ok(hasher.finalize())
}

/// Fingerprint every file under `root`, skipping dependency and build
/// directories.
pub fn tree_snapshot(root: &Path) -> TandemResult<TreeSnapshot> {
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_type().is_dir() || !is_skipped(e.file_name().to_string_lossy().as_ref())
        });
    let mut snapshot = TreeSnapshot::new();
    for entry in walker {
        let entry = entry.map_err(|e| TandemError::Io(std::io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| TandemError::Io(std::io::Error::from(e)))?;
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel = rel.to_string_lossy().replace('\\', "/");
        snapshot.insert(rel, file_fingerprint(entry.path(), &metadata)?);
    }
    Ok(snapshot)
}

/// Paths present in only one snapshot or fingerprinted differently.
pub fn diff_snapshots(before: &TreeSnapshot, after: &TreeSnapshot) -> Vec<String> {
    let mut changed: Vec<String> = after
        .iter()
        .filter(|(path, fingerprint)| before.get(*path) != Some(*fingerprint))
        .map(|(path, _)| path.clone())
        .chain(before.keys().filter(|path| !after.contains_key(*path)).cloned())
        .collect();
    changed.sort();
    changed
}

impl<V: Clone> AnalysisCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: Mutex::new(IndexMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Cached value for `root` when no file under it changed, otherwise the
    /// result of `loader`.
    pub fn get_or_load<F>(&self, root: &Path, loader: F) -> TandemResult<Lookup<V>>
    where
        F: FnOnce() -> TandemResult<V>,
    {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let snapshot = tree_snapshot(&key)?;
        let changed = {
            let mut entries = self.entries.lock();
            match entries.get_index_of(&key) {
                Some(index) if entries[index].snapshot == snapshot => {
                    let last = entries.len() - 1;
                    entries.move_index(index, last);
                    self.stats.lock().hits += 1;
                    debug!("Cache hit for {}", key.display());
                    return Ok(Lookup {
                        value: entries[last].value.clone(),
                        fresh: false,
                        changed: Vec::new(),
                    });
                }
                Some(index) => {
                    let changed = diff_snapshots(&entries[index].snapshot, &snapshot);
                    entries.shift_remove_index(index);
                    changed
                }
                None => snapshot.keys().cloned().collect(),
            }
        };

        self.stats.lock().misses += 1;
        debug!("Cache miss for {}: {} file(s) changed", key.display(), changed.len());
        let value = loader()?;
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                snapshot,
                value: value.clone(),
            },
        );
        while entries.len() > self.max_entries {
            entries.shift_remove_index(0);
        }
        Ok(Lookup {
            value,
            fresh: true,
            changed,
        })
    }

    pub fn invalidate(&self, root: &Path) {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        self.entries.lock().shift_remove(&key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("main.go"), "package main\n").unwrap();
        tmp
    }

    fn load<V: Clone>(cache: &AnalysisCache<V>, root: &Path, value: V) -> (V, bool) {
        let lookup = cache.get_or_load(root, || Ok(value)).unwrap();
        (lookup.value, lookup.fresh)
    }

    #[test]
    fn test_unchanged_tree_hits() {
        let tmp = project();
        let cache = AnalysisCache::new(4);
        let first = cache.get_or_load(tmp.path(), || Ok(1)).unwrap();
        assert_eq!((first.value, first.fresh), (1, true));
        assert_eq!(first.changed, vec!["main.go".to_string()]);
        let second = cache.get_or_load(tmp.path(), || Ok(2)).unwrap();
        assert_eq!((second.value, second.fresh), (1, false));
        assert!(second.changed.is_empty());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_new_file_reloads() {
        let tmp = project();
        let cache = AnalysisCache::new(4);
        load(&cache, tmp.path(), "old");
        fs::write(tmp.path().join("extra.go"), "package main\n\nfunc Extra() {}\n").unwrap();
        let lookup = cache.get_or_load(tmp.path(), || Ok("new")).unwrap();
        assert_eq!((lookup.value, lookup.fresh), ("new", true));
        assert_eq!(lookup.changed, vec!["extra.go".to_string()]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reports_only_edited_and_removed_files() {
        let tmp = project();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("pkg/a.go"), "package pkg\n").unwrap();
        fs::write(tmp.path().join("pkg/b.go"), "package pkg\n").unwrap();
        let cache = AnalysisCache::new(4);
        load(&cache, tmp.path(), 0);

        fs::write(tmp.path().join("pkg/a.go"), "package pkg\n\nfunc A() {}\n").unwrap();
        let lookup = cache.get_or_load(tmp.path(), || Ok(1)).unwrap();
        assert_eq!(lookup.changed, vec!["pkg/a.go".to_string()]);

        fs::remove_file(tmp.path().join("pkg/b.go")).unwrap();
        let lookup = cache.get_or_load(tmp.path(), || Ok(2)).unwrap();
        assert_eq!(lookup.changed, vec!["pkg/b.go".to_string()]);
    }

    #[test]
    fn test_skipped_dirs_do_not_count() {
        let tmp = project();
        let before = tree_snapshot(tmp.path()).unwrap();
        fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        fs::write(tmp.path().join("node_modules/pkg/index.js"), "x").unwrap();
        assert_eq!(tree_snapshot(tmp.path()).unwrap(), before);
    }

    #[test]
    fn test_loader_error_is_not_cached() {
        let tmp = project();
        let cache: AnalysisCache<u8> = AnalysisCache::new(4);
        let failed = cache.get_or_load(tmp.path(), || Err(TandemError::Cancelled));
        assert!(matches!(failed, Err(TandemError::Cancelled)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (a, b, c) = (project(), project(), project());
        let cache = AnalysisCache::new(2);
        load(&cache, a.path(), 'a');
        load(&cache, b.path(), 'b');
        load(&cache, a.path(), 'x');
        load(&cache, c.path(), 'c');
        assert_eq!(cache.len(), 2);
        assert_eq!(load(&cache, a.path(), 'y'), ('a', false));
        assert_eq!(load(&cache, b.path(), 'z'), ('z', true));
        cache.invalidate(a.path());
        assert_eq!(cache.len(), 1);
    }
}
