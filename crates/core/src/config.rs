use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::SimilarityLevel;

pub const FINGERPRINT_CACHE_FILE: &str = "featureprint_cache.sqlite";
pub const PROGRESS_FILE: &str = "scan_progress.json";
pub const FOUND_GROUPS_FILE: &str = "found_groups.json";
pub const THUMBNAIL_DIR: &str = "thumbs";

/// Tunables for the scan engine. `Default` matches the shipped behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Directory holding the fingerprint cache, checkpoint files and thumbnails.
    pub cache_dir: PathBuf,
    /// Maximum distance from a cluster's first dated asset.
    pub cluster_gap: Duration,
    /// Size of the image requested for fingerprinting.
    pub fingerprint_size: u32,
    pub fingerprint_timeout: Duration,
    /// Fingerprint workers under nominal/fair thermal state.
    pub max_workers: usize,
    /// Fingerprint workers under serious thermal state.
    pub throttled_workers: usize,
    /// Pause after the counting event, for UI pacing only.
    pub counting_pause: Duration,
    pub thumbnail_concurrency: usize,
    /// Attempt ladder for thumbnail exports: high quality, fast + network, fast local.
    pub thumbnail_timeouts: [Duration; 3],
    pub default_level: SimilarityLevel,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("photosift"),
            cluster_gap: Duration::from_secs(5 * 60),
            fingerprint_size: 300,
            fingerprint_timeout: Duration::from_secs(30),
            max_workers: default_worker_count(num_cpus::get()),
            throttled_workers: 2,
            counting_pause: Duration::from_secs(1),
            thumbnail_concurrency: 6,
            thumbnail_timeouts: [
                Duration::from_secs(15),
                Duration::from_secs(8),
                Duration::from_secs(5),
            ],
            default_level: SimilarityLevel::Similar,
        }
    }
}

impl ScannerConfig {
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn fingerprint_cache_path(&self) -> PathBuf {
        self.cache_dir.join(FINGERPRINT_CACHE_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.cache_dir.join(PROGRESS_FILE)
    }

    pub fn found_groups_path(&self) -> PathBuf {
        self.cache_dir.join(FOUND_GROUPS_FILE)
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.cache_dir.join(THUMBNAIL_DIR)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// `clamp(cpus - 1, 2, 4)`: leave a core for the caller, never drop below 2 workers.
pub fn default_worker_count(cpus: usize) -> usize {
    cpus.saturating_sub(1).clamp(2, 4)
}
