pub mod cache;
pub mod delete;
pub mod groups;
pub mod scan;
pub mod status;
pub mod thumbs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use photosift_core::{DirectoryLibrary, EventSink, PerceptualModel, Scanner, ScannerConfig};

/// Options shared by every command.
pub struct Session {
    pub cache_dir: PathBuf,
    pub json: bool,
}

impl Session {
    /// Build a scanner over the directory library at `root`.
    pub fn open(&self, root: &Path, events: Arc<dyn EventSink>) -> Result<Scanner> {
        let library = DirectoryLibrary::open(root)
            .with_context(|| format!("cannot open library {}", root.display()))?;
        let config = ScannerConfig::with_cache_dir(&self.cache_dir);
        let scanner = Scanner::new(
            config,
            Arc::new(library),
            Arc::new(PerceptualModel::new()),
            events,
        )
        .with_context(|| format!("cannot prepare cache dir {}", self.cache_dir.display()))?;
        Ok(scanner)
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_open_missing_library_fails() {
        let cache = tempfile::tempdir().unwrap();
        let session = Session {
            cache_dir: cache.path().to_path_buf(),
            json: false,
        };
        let err = session
            .open(&cache.path().join("nope"), Arc::new(photosift_core::NoopSink))
            .err().unwrap();
        assert!(err.to_string().contains("cannot open library"));
    }
}
