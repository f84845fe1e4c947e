use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::error::Result;
use crate::library::{request_with_timeout, Delivery, ImageRequest, PhotoLibrary};
use crate::persistence::write_atomic;

pub const PREVIEW_SIZE: u32 = 1500;
const THUMBNAIL_QUALITY: u8 = 90;
const BATCH_QUALITY: u8 = 85;

/// Writes JPEG renditions of assets into the cache's thumbnail directory.
///
/// Each export walks an attempt ladder: high quality with network access, then fast
/// with network access, then fast local-only, each with a shorter deadline.
pub struct ThumbnailExporter {
    dir: PathBuf,
    library: Arc<dyn PhotoLibrary>,
    pool: rayon::ThreadPool,
    timeouts: [std::time::Duration; 3],
}

impl ThumbnailExporter {
    pub fn new(config: &ScannerConfig, library: Arc<dyn PhotoLibrary>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.thumbnail_concurrency.max(1))
            .thread_name(|i| format!("photosift-thumb-{i}"))
            .build()?;
        Ok(Self {
            dir: config.thumbnail_dir(),
            library,
            pool,
            timeouts: config.thumbnail_timeouts,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Single thumbnail at quality 90.
    pub fn thumbnail(&self, asset_id: &str, width: u32, height: u32) -> Option<PathBuf> {
        self.export(asset_id, width, height, "t", THUMBNAIL_QUALITY)
    }

    /// Batch of thumbnails, exported concurrently. Ids that fail are absent from the map.
    pub fn thumbnails(&self, asset_ids: &[String], width: u32, height: u32) -> HashMap<String, PathBuf> {
        self.pool.install(|| {
            asset_ids
                .par_iter()
                .filter_map(|id| {
                    self.export(id, width, height, "t", BATCH_QUALITY)
                        .map(|path| (id.clone(), path))
                })
                .collect()
        })
    }

    /// Large rendition for full-screen viewing.
    pub fn preview(&self, asset_id: &str) -> Option<PathBuf> {
        self.export(asset_id, PREVIEW_SIZE, PREVIEW_SIZE, "p", BATCH_QUALITY)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn export(&self, asset_id: &str, width: u32, height: u32, prefix: &str, quality: u8) -> Option<PathBuf> {
        let path = self.dir.join(file_name(prefix, asset_id, width, height));
        if path.is_file() {
            return Some(path);
        }

        let asset = match self.library.fetch_assets_by_ids(&[asset_id.to_string()]) {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                warn!(asset = asset_id, error = %e, "thumbnail lookup failed");
                None
            }
        };
        let Some(asset) = asset else {
            debug!(asset = asset_id, "no such asset for thumbnail");
            return None;
        };

        for request in self.attempts(width, height) {
            match request_with_timeout(&self.library, &asset, &request) {
                Ok(image) => match write_jpeg(&path, &image, quality) {
                    Ok(()) => return Some(path),
                    Err(e) => {
                        warn!(asset = asset_id, error = %e, "failed to write thumbnail");
                        return None;
                    }
                },
                Err(e) => debug!(asset = asset_id, delivery = ?request.delivery, error = %e, "thumbnail attempt failed"),
            }
        }
        warn!(asset = asset_id, "thumbnail unavailable after all attempts");
        None
    }

    fn attempts(&self, width: u32, height: u32) -> [ImageRequest; 3] {
        [
            ImageRequest::new(width, height, self.timeouts[0]),
            ImageRequest::new(width, height, self.timeouts[1]).delivery(Delivery::Fast),
            ImageRequest::new(width, height, self.timeouts[2])
                .delivery(Delivery::Fast)
                .network_access(false),
        ]
    }
}

/// `<prefix>_<first 16 hex of sha256(id)>_<w>x<h>.jpg`. Ids may contain path
/// separators, so they are hashed rather than embedded.
pub fn file_name(prefix: &str, asset_id: &str, width: u32, height: u32) -> String {
    let digest = Sha256::digest(asset_id.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{prefix}_{hex}_{width}x{height}.jpg")
}

fn write_jpeg(path: &Path, image: &DynamicImage, quality: u8) -> Result<()> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    write_atomic(path, &buf)?;
    Ok(())
}
