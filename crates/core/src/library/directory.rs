use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use image::DynamicImage;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::decode;
use super::{ImageRequest, PhotoLibrary};
use crate::domain::{Authorization, PhotoAsset};
use crate::error::{Error, Result};

const STAGING_PREFIX: &str = ".photosift-trash-";

/// A folder of image files treated as a photo library.
///
/// Asset ids are paths relative to the root, with `/` separators. Capture time comes
/// from EXIF `DateTimeOriginal`, falling back to the file's modification time.
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.exists() {
            return Err(Error::LibraryNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(Error::LibraryNotDirectory(root.to_path_buf()));
        }
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and return every supported image file, skipping hidden entries.
    fn image_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }

    fn asset_id(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    /// Resolve an id back to a path inside the root. Ids that would escape the
    /// root are rejected.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn asset_for(&self, path: &Path) -> Option<PhotoAsset> {
        let id = self.asset_id(path)?;
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };

        let creation_date = decode::read_capture_date(path).or_else(|| {
            metadata
                .modified()
                .ok()
                .map(|mtime| DateTime::<Local>::from(mtime).fixed_offset())
        });
        let (width, height) = image::image_dimensions(path).unwrap_or((0, 0));
        let uri = format!("file://{}", path.display());

        Some(PhotoAsset::new(
            id,
            uri,
            creation_date,
            width,
            height,
            Some(metadata.len()),
        ))
    }
}

impl PhotoLibrary for DirectoryLibrary {
    fn request_authorization(&self) -> Authorization {
        if std::fs::read_dir(&self.root).is_err() {
            return Authorization::Denied;
        }
        match std::fs::metadata(&self.root) {
            Ok(m) if m.permissions().readonly() => Authorization::Limited,
            Ok(_) => Authorization::Authorized,
            Err(_) => Authorization::Denied,
        }
    }

    fn fetch_assets(&self) -> Result<Vec<PhotoAsset>> {
        let paths = self
            .image_paths()
            .map_err(|e| Error::Enumeration(e.to_string()))?;
        let mut assets: Vec<PhotoAsset> = paths.iter().filter_map(|p| self.asset_for(p)).collect();
        assets.sort_by(|a, b| {
            (a.creation_date.is_none(), a.creation_date, &a.id)
                .cmp(&(b.creation_date.is_none(), b.creation_date, &b.id))
        });
        debug!(count = assets.len(), root = %self.root.display(), "enumerated library");
        Ok(assets)
    }

    fn fetch_assets_by_ids(&self, ids: &[String]) -> Result<Vec<PhotoAsset>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.path_for(id))
            .filter(|path| path.is_file() && is_supported(path))
            .filter_map(|path| self.asset_for(&path))
            .collect())
    }

    fn asset_count(&self) -> Result<usize> {
        Ok(self
            .image_paths()
            .map_err(|e| Error::Enumeration(e.to_string()))?
            .len())
    }

    fn request_image(&self, asset: &PhotoAsset, request: &ImageRequest) -> Result<DynamicImage> {
        let path = self
            .path_for(&asset.id)
            .ok_or_else(|| Error::AssetNotFound(asset.id.clone()))?;
        if !path.is_file() {
            return Err(Error::AssetNotFound(asset.id.clone()));
        }
        decode::load_for_request(&path, request).map_err(|e| Error::ImageUnavailable {
            id: asset.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Move every file into a staging directory first, rolling back on any failure,
    /// then drop the staging directory.
    fn delete_assets(&self, assets: &[PhotoAsset]) -> Result<()> {
        if assets.is_empty() {
            return Ok(());
        }
        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
        std::fs::create_dir(&staging)?;

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(assets.len());
        for (i, asset) in assets.iter().enumerate() {
            let outcome = match self.path_for(&asset.id) {
                Some(original) => {
                    let staged = staging.join(format!("{i}"));
                    std::fs::rename(&original, &staged)
                        .map(|_| (original, staged))
                        .map_err(|e| format!("{}: {e}", asset.id))
                }
                None => Err(format!("{}: invalid asset id", asset.id)),
            };
            match outcome {
                Ok(pair) => moved.push(pair),
                Err(reason) => {
                    warn!(reason = %reason, "delete failed, restoring staged files");
                    rollback(&moved);
                    let _ = std::fs::remove_dir_all(&staging);
                    return Err(Error::DeleteFailed(reason));
                }
            }
        }

        std::fs::remove_dir_all(&staging)?;
        info!(count = assets.len(), "deleted assets");
        Ok(())
    }
}

fn rollback(moved: &[(PathBuf, PathBuf)]) {
    for (original, staged) in moved.iter().rev() {
        if let Err(e) = std::fs::rename(staged, original) {
            warn!(path = %original.display(), error = %e, "failed to restore staged file");
        }
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Formats the image stack can decode.
fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp"
            )
        })
}
