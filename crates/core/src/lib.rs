//! Near-duplicate photo detection.
//!
//! Assets are split into capture-time bursts, each burst is fingerprinted with a
//! perceptual embedding, and members closer than a distance threshold are joined
//! into groups. [`Scanner`] drives the whole pipeline with pause/resume,
//! on-disk checkpoints and thermal throttling.

pub mod clustering;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod grouping;
pub mod library;
pub mod persistence;
pub mod scanner;
pub mod thermal;
pub mod thumbnails;

pub use config::ScannerConfig;
pub use domain::{
    AssetPage, Authorization, DeleteResult, FeaturePrint, PhotoAsset, ScanPhase, ScanProgress,
    SimilarGroup, SimilarityLevel,
};
pub use error::{Error, Result};
pub use events::{EventSink, NoopSink, ScanEvent};
pub use fingerprint::{EmbeddingModel, PerceptualModel};
pub use library::{DirectoryLibrary, ImageRequest, PhotoLibrary};
pub use persistence::ProgressCheckpoint;
pub use scanner::{RunOutcome, Scanner};
pub use thermal::{ThermalBroadcaster, ThermalLevel, ThermalSignal};
