use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::domain::{ScanPhase, SimilarGroup};
use crate::error::Result;

/// Where an interrupted scan stopped: `current` of `total` assets already grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressCheckpoint {
    pub current: usize,
    pub total: usize,
    pub phase: ScanPhase,
}

impl ProgressCheckpoint {
    pub fn grouping(current: usize, total: usize) -> Self {
        Self {
            current,
            total,
            phase: ScanPhase::Grouping,
        }
    }

    pub fn is_resumable(&self) -> bool {
        self.phase != ScanPhase::Idle && self.current > 0
    }
}

/// The two JSON files that let an interrupted scan continue: the progress
/// checkpoint and the groups found so far.
pub struct CheckpointStore {
    progress_path: PathBuf,
    groups_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            progress_path: config.progress_path(),
            groups_path: config.found_groups_path(),
        }
    }

    pub fn save_progress(&self, checkpoint: &ProgressCheckpoint) -> Result<()> {
        let json = serde_json::to_vec(checkpoint)?;
        write_atomic(&self.progress_path, &json)?;
        Ok(())
    }

    /// The saved checkpoint, if there is one worth resuming from.
    pub fn load_progress(&self) -> Option<ProgressCheckpoint> {
        let checkpoint: ProgressCheckpoint = read_json(&self.progress_path)?;
        checkpoint.is_resumable().then_some(checkpoint)
    }

    /// Persist groups found so far. An empty list leaves the file untouched.
    pub fn save_groups(&self, groups: &[SimilarGroup]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_vec(groups)?;
        write_atomic(&self.groups_path, &json)?;
        debug!(count = groups.len(), "saved found groups");
        Ok(())
    }

    pub fn load_groups(&self) -> Option<Vec<SimilarGroup>> {
        read_json(&self.groups_path)
    }

    pub fn delete_progress(&self) -> Result<()> {
        remove_if_exists(&self.progress_path)
    }

    pub fn delete_groups(&self) -> Result<()> {
        remove_if_exists(&self.groups_path)
    }

    /// Remove both files, logging rather than failing.
    pub fn clear(&self) {
        for path in [&self.progress_path, &self.groups_path] {
            if let Err(e) = remove_if_exists(path) {
                warn!(path = %path.display(), error = %e, "failed to remove checkpoint file");
            }
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read checkpoint file");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed checkpoint file");
            None
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write to a sibling temp file, then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PhotoAsset;

    fn store(dir: &Path) -> CheckpointStore {
        CheckpointStore::new(&ScannerConfig::with_cache_dir(dir))
    }

    fn group(ids: &[&str]) -> SimilarGroup {
        let assets = ids
            .iter()
            .map(|id| PhotoAsset::new(*id, format!("test://{id}"), None, 300, 300, Some(1024)))
            .collect();
        SimilarGroup::new(assets, 0.9)
    }

    #[test]
    fn test_progress_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        store.save_progress(&ProgressCheckpoint::grouping(120, 500)).unwrap();
        assert_eq!(store.load_progress(), Some(ProgressCheckpoint::grouping(120, 500)));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(tmp.path().join("scan_progress.json")).unwrap()).unwrap();
        assert_eq!(raw["phase"], "grouping");
        assert_eq!(raw["current"], 120);
    }

    #[test]
    fn test_zero_progress_not_resumable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        store.save_progress(&ProgressCheckpoint::grouping(0, 500)).unwrap();
        assert!(store.load_progress().is_none());

        let idle = ProgressCheckpoint {
            current: 10,
            total: 500,
            phase: ScanPhase::Idle,
        };
        assert!(!idle.is_resumable());
    }

    #[test]
    fn test_malformed_progress_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("scan_progress.json"), b"{ not json").unwrap();
        assert!(store(tmp.path()).load_progress().is_none());
    }

    #[test]
    fn test_groups_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let groups = vec![group(&["a", "b"]), group(&["c", "d", "e"])];
        store.save_groups(&groups).unwrap();
        assert_eq!(store.load_groups(), Some(groups));
    }

    #[test]
    fn test_empty_groups_not_written() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        store.save_groups(&[]).unwrap();
        assert!(!tmp.path().join("found_groups.json").exists());
        assert!(store.load_groups().is_none());
    }

    #[test]
    fn test_clear_removes_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        store.save_progress(&ProgressCheckpoint::grouping(3, 10)).unwrap();
        store.save_groups(&[group(&["a", "b"])]).unwrap();
        store.clear();
        assert!(store.load_progress().is_none());
        assert!(store.load_groups().is_none());
        // Clearing again is fine.
        store.clear();
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/out.json");
        write_atomic(&path, b"[1,2,3]").unwrap();
        write_atomic(&path, b"[4]").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"[4]");
        assert!(!tmp.path().join("nested/out.json.tmp").exists());
    }
}
