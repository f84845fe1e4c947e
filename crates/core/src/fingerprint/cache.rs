use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::domain::FeaturePrint;
use crate::error::Result;

/// In-memory asset id → feature print map shared by all fingerprint workers.
///
/// A miss for a given id is computed by exactly one caller at a time; concurrent
/// callers for the same id wait for that computation instead of repeating it.
#[derive(Default)]
pub struct FingerprintCache {
    state: Mutex<CacheState>,
    computed: Condvar,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, FeaturePrint>,
    in_flight: HashSet<String>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, asset_id: &str) -> Option<FeaturePrint> {
        self.lock().entries.get(asset_id).cloned()
    }

    pub fn insert(&self, asset_id: impl Into<String>, print: FeaturePrint) {
        self.lock().entries.insert(asset_id.into(), print);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Add entries loaded from disk. Entries already in memory win.
    pub fn merge(&self, loaded: HashMap<String, FeaturePrint>) {
        let mut state = self.lock();
        for (id, print) in loaded {
            state.entries.entry(id).or_insert(print);
        }
    }

    pub fn snapshot(&self) -> HashMap<String, FeaturePrint> {
        self.lock().entries.clone()
    }

    /// Return the cached print for `asset_id`, or run `compute` once and cache a
    /// successful result. A failed computation is not cached.
    pub fn get_or_compute<F>(&self, asset_id: &str, compute: F) -> Option<FeaturePrint>
    where
        F: FnOnce() -> Option<FeaturePrint>,
    {
        let mut state = self.lock();
        loop {
            if let Some(print) = state.entries.get(asset_id) {
                return Some(print.clone());
            }
            if !state.in_flight.contains(asset_id) {
                break;
            }
            state = self
                .computed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.in_flight.insert(asset_id.to_string());
        drop(state);

        let guard = InFlight {
            cache: self,
            asset_id,
        };
        let result = compute();
        if let Some(ref print) = result {
            self.lock().entries.insert(asset_id.to_string(), print.clone());
        }
        drop(guard);
        result
    }
}

/// Clears the in-flight mark and wakes waiters, even if `compute` panics.
struct InFlight<'a> {
    cache: &'a FingerprintCache,
    asset_id: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cache.lock().in_flight.remove(self.asset_id);
        self.cache.computed.notify_all();
    }
}

/// SQLite file persisting the cache between scans.
///
/// Entries are tagged with the embedding model id; a file written by another model
/// is treated as empty so incompatible vectors are never compared.
pub struct FingerprintStore {
    path: PathBuf,
    model_id: String,
}

impl FingerprintStore {
    pub fn new(path: impl Into<PathBuf>, model_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model_id: model_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries. A missing, unreadable or foreign file yields an empty map.
    pub fn load(&self) -> HashMap<String, FeaturePrint> {
        if !self.path.exists() {
            return HashMap::new();
        }
        match self.try_load() {
            Ok(entries) => {
                debug!(count = entries.len(), "loaded fingerprint cache");
                entries
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "fingerprint cache unreadable, starting empty");
                HashMap::new()
            }
        }
    }

    fn try_load(&self) -> Result<HashMap<String, FeaturePrint>> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let stored_model: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'model_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if stored_model.as_deref() != Some(self.model_id.as_str()) {
            debug!(
                stored = ?stored_model,
                current = %self.model_id,
                "fingerprint cache written by another model, ignoring"
            );
            return Ok(HashMap::new());
        }

        let mut stmt = conn.prepare("SELECT asset_id, vec FROM prints")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut entries = HashMap::new();
        for row in rows {
            let (asset_id, blob) = row?;
            match FeaturePrint::from_le_bytes(&blob) {
                Some(print) => {
                    entries.insert(asset_id, print);
                }
                None => debug!(asset = %asset_id, "skipping undecodable cache row"),
            }
        }
        Ok(entries)
    }

    /// Replace the file contents with `entries` in one transaction.
    /// A corrupt file is removed and recreated.
    pub fn save(&self, entries: &HashMap<String, FeaturePrint>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        match self.try_save(entries) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "rewriting fingerprint cache");
                self.remove_file()?;
                self.try_save(entries)
            }
        }
    }

    fn try_save(&self, entries: &HashMap<String, FeaturePrint>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&self.path)?;
        initialize(&conn)?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM prints", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO prints (asset_id, vec) VALUES (?1, ?2)")?;
            for (asset_id, print) in entries {
                stmt.execute(params![asset_id, print.to_le_bytes()])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('model_id', ?1)",
            params![self.model_id],
        )?;
        tx.commit()?;
        debug!(count = entries.len(), "saved fingerprint cache");
        Ok(())
    }

    pub fn remove_file(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS prints (
            asset_id TEXT PRIMARY KEY,
            vec      BLOB NOT NULL
        );
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn print(values: &[f32]) -> FeaturePrint {
        FeaturePrint::new(values.to_vec())
    }

    #[test]
    fn test_get_or_compute_caches_success() {
        let cache = FingerprintCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(print(&[1.0, 2.0]))
        };
        let first = cache.get_or_compute("a", compute);
        let second = cache.get_or_compute("a", || {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        });
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_or_compute_does_not_cache_failure() {
        let cache = FingerprintCache::new();
        assert!(cache.get_or_compute("a", || None).is_none());
        assert!(cache.is_empty());
        assert!(cache.get_or_compute("a", || Some(print(&[0.5]))).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_miss_computes_once() {
        let cache = Arc::new(FingerprintCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache.get_or_compute("same", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Some(print(&[3.0]))
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(print(&[3.0])));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_merge_keeps_memory_entries() {
        let cache = FingerprintCache::new();
        cache.insert("a", print(&[1.0]));
        let mut loaded = HashMap::new();
        loaded.insert("a".to_string(), print(&[9.0]));
        loaded.insert("b".to_string(), print(&[2.0]));
        cache.merge(loaded);
        assert_eq!(cache.get("a"), Some(print(&[1.0])));
        assert_eq!(cache.get("b"), Some(print(&[2.0])));
    }

    #[test]
    fn test_store_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FingerprintStore::new(tmp.path().join("cache.sqlite"), "model-a");
        let mut entries = HashMap::new();
        entries.insert("x".to_string(), print(&[0.25, -1.5, 3.0]));
        entries.insert("y".to_string(), print(&[0.0, 0.0, 1.0]));
        store.save(&entries).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, entries);
    }

    #[test]
    fn test_store_save_replaces_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FingerprintStore::new(tmp.path().join("cache.sqlite"), "model-a");
        let mut first = HashMap::new();
        first.insert("old".to_string(), print(&[1.0]));
        store.save(&first).unwrap();

        let mut second = HashMap::new();
        second.insert("new".to_string(), print(&[2.0]));
        store.save(&second).unwrap();

        assert_eq!(store.load(), second);
    }

    #[test]
    fn test_store_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FingerprintStore::new(tmp.path().join("absent.sqlite"), "model-a");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_store_corrupt_file_is_empty_and_recoverable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.sqlite");
        std::fs::write(&path, b"definitely not a sqlite database, just garbage bytes").unwrap();
        let store = FingerprintStore::new(&path, "model-a");
        assert!(store.load().is_empty());

        let mut entries = HashMap::new();
        entries.insert("x".to_string(), print(&[1.0]));
        store.save(&entries).unwrap();
        assert_eq!(store.load(), entries);
    }

    #[test]
    fn test_store_other_model_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.sqlite");
        let mut entries = HashMap::new();
        entries.insert("x".to_string(), print(&[1.0]));
        FingerprintStore::new(&path, "model-a").save(&entries).unwrap();

        assert!(FingerprintStore::new(&path, "model-b").load().is_empty());
    }
}
