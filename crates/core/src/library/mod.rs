pub mod decode;
pub mod directory;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::DynamicImage;
use tracing::debug;

use crate::domain::{Authorization, PhotoAsset};
use crate::error::{Error, Result};

pub use directory::DirectoryLibrary;

/// How hard the library should try when producing an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    HighQuality,
    Fast,
}

/// Parameters for one image request. The image is scaled to cover the box
/// (`width` x `height`) while keeping its aspect ratio.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub width: u32,
    pub height: u32,
    pub delivery: Delivery,
    /// Allow fetching originals that are not stored locally.
    pub network_access: bool,
    pub timeout: Duration,
}

impl ImageRequest {
    pub fn new(width: u32, height: u32, timeout: Duration) -> Self {
        Self {
            width,
            height,
            delivery: Delivery::HighQuality,
            network_access: true,
            timeout,
        }
    }

    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn network_access(mut self, allowed: bool) -> Self {
        self.network_access = allowed;
        self
    }
}

/// The photo store being scanned.
///
/// `fetch_assets` must return assets sorted ascending by capture time. Deleting is
/// all-or-nothing: either every asset is removed or none is.
pub trait PhotoLibrary: Send + Sync {
    fn request_authorization(&self) -> Authorization;

    fn fetch_assets(&self) -> Result<Vec<PhotoAsset>>;

    /// Look up assets by id. Unknown ids are skipped.
    fn fetch_assets_by_ids(&self, ids: &[String]) -> Result<Vec<PhotoAsset>>;

    fn asset_count(&self) -> Result<usize> {
        Ok(self.fetch_assets()?.len())
    }

    fn request_image(&self, asset: &PhotoAsset, request: &ImageRequest) -> Result<DynamicImage>;

    /// Abandon an outstanding request for `asset` after its deadline passed.
    fn cancel_request(&self, _asset: &PhotoAsset) {}

    fn delete_assets(&self, assets: &[PhotoAsset]) -> Result<()>;
}

/// Run `request_image` on a helper thread and give up after `request.timeout`.
///
/// A request still running at the deadline is told to cancel and its eventual
/// result is discarded.
pub fn request_with_timeout(
    library: &Arc<dyn PhotoLibrary>,
    asset: &PhotoAsset,
    request: &ImageRequest,
) -> Result<DynamicImage> {
    let (tx, rx) = mpsc::sync_channel(1);
    let worker_library = Arc::clone(library);
    let worker_asset = asset.clone();
    let worker_request = request.clone();

    thread::Builder::new()
        .name("photosift-image".to_string())
        .spawn(move || {
            let result = worker_library.request_image(&worker_asset, &worker_request);
            // Receiver is gone when the caller timed out.
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(request.timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            debug!(asset = %asset.id, "image request timed out");
            library.cancel_request(asset);
            Err(Error::Timeout {
                id: asset.id.clone(),
                seconds: request.timeout.as_secs(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::ImageUnavailable {
            id: asset.id.clone(),
            reason: "image request worker exited".to_string(),
        }),
    }
}
