pub mod cache;
pub mod perceptual;

use std::sync::Arc;

use image::DynamicImage;
use rayon::prelude::*;
use tracing::debug;

use crate::config::ScannerConfig;
use crate::domain::{FeaturePrint, PhotoAsset};
use crate::error::Result;
use crate::library::{request_with_timeout, ImageRequest, PhotoLibrary};

pub use cache::{FingerprintCache, FingerprintStore};
pub use perceptual::PerceptualModel;

/// Turns a decoded image into a fixed-size feature vector.
///
/// `model_id` tags persisted vectors; prints from different ids are never compared.
pub trait EmbeddingModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn embed(&self, image: &DynamicImage) -> Result<FeaturePrint>;
}

/// Fetches images from the library, embeds them and memoises the result per asset.
pub struct FingerprintExtractor {
    library: Arc<dyn PhotoLibrary>,
    model: Arc<dyn EmbeddingModel>,
    cache: FingerprintCache,
    store: FingerprintStore,
    request: ImageRequest,
}

impl FingerprintExtractor {
    pub fn new(
        library: Arc<dyn PhotoLibrary>,
        model: Arc<dyn EmbeddingModel>,
        config: &ScannerConfig,
    ) -> Self {
        let store = FingerprintStore::new(config.fingerprint_cache_path(), model.model_id());
        let request = ImageRequest::new(
            config.fingerprint_size,
            config.fingerprint_size,
            config.fingerprint_timeout,
        );
        Self {
            library,
            model,
            cache: FingerprintCache::new(),
            store,
            request,
        }
    }

    /// Feature print for one asset, or `None` when the image could not be obtained
    /// or embedded in time. Failures are not cached, so a later scan retries them.
    pub fn fingerprint(&self, asset: &PhotoAsset) -> Option<FeaturePrint> {
        self.cache
            .get_or_compute(&asset.id, || match self.compute(asset) {
                Ok(print) => Some(print),
                Err(e) => {
                    debug!(asset = %asset.id, error = %e, "no fingerprint");
                    None
                }
            })
    }

    fn compute(&self, asset: &PhotoAsset) -> Result<FeaturePrint> {
        let image = request_with_timeout(&self.library, asset, &self.request)?;
        self.model.embed(&image)
    }

    /// Fingerprint every member of a cluster on `pool`, preserving order.
    pub fn fingerprints(&self, assets: &[PhotoAsset], pool: &rayon::ThreadPool) -> Vec<Option<FeaturePrint>> {
        pool.install(|| assets.par_iter().map(|asset| self.fingerprint(asset)).collect())
    }

    /// Merge the persisted cache into memory.
    pub fn load_cache(&self) {
        self.cache.merge(self.store.load());
    }

    pub fn save_cache(&self) -> Result<()> {
        self.store.save(&self.cache.snapshot())
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear();
        self.store.remove_file()
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }
}
