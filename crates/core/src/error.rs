use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("library path does not exist: {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("library path is not a directory: {}", .0.display())]
    LibraryNotDirectory(PathBuf),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("image unavailable for {id}: {reason}")]
    ImageUnavailable { id: String, reason: String },

    #[error("image request for {id} timed out after {seconds}s")]
    Timeout { id: String, seconds: u64 },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("failed to enumerate photo library: {0}")]
    Enumeration(String),

    #[error("a scan is already running")]
    ScanInProgress,

    #[error("delete failed: {0}")]
    DeleteFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
