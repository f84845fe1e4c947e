use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Snapshot of one library item taken at enumeration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAsset {
    /// Stable, opaque identifier unique within the library.
    pub id: String,
    pub uri: String,
    /// Capture time. `None` makes the asset ride along with whatever cluster is open.
    pub creation_date: Option<DateTime<FixedOffset>>,
    /// Size in bytes; an estimate when the library could not report one.
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
}

impl PhotoAsset {
    pub fn new(
        id: impl Into<String>,
        uri: impl Into<String>,
        creation_date: Option<DateTime<FixedOffset>>,
        width: u32,
        height: u32,
        file_size: Option<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            creation_date,
            file_size: resolve_file_size(file_size, width, height),
            width,
            height,
        }
    }
}

/// Use the reported size when it is positive, otherwise estimate from the pixel count
/// assuming typical JPEG compression.
pub fn resolve_file_size(reported: Option<u64>, width: u32, height: u32) -> u64 {
    match reported {
        Some(size) if size > 0 => size,
        _ => estimate_file_size(width, height),
    }
}

pub fn estimate_file_size(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 / 3
}

/// Fixed-size perceptual feature vector for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePrint(Vec<f32>);

impl FeaturePrint {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance. Returns `None` when the prints have different dimensions
    /// (e.g. produced by different models) and are therefore not comparable.
    pub fn distance(&self, other: &FeaturePrint) -> Option<f32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }

    /// Encode as a little-endian f32 blob.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decode a little-endian f32 blob. Returns `None` if the length is not a multiple of 4.
    pub fn from_le_bytes(blob: &[u8]) -> Option<Self> {
        if blob.len() % 4 != 0 {
            return None;
        }
        let values = blob
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self(values))
    }
}

/// Contiguous burst of assets sharing a calendar day. Always has at least 2 members.
pub type TimeCluster = Vec<PhotoAsset>;

/// A connected component of visually similar assets found in one time cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarGroup {
    pub id: String,
    pub assets: Vec<PhotoAsset>,
    /// Members the user chose to keep. The engine never fills this in.
    #[serde(default)]
    pub keep_asset_ids: BTreeSet<String>,
    pub max_similarity: f64,
}

impl SimilarGroup {
    pub fn new(assets: Vec<PhotoAsset>, max_similarity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            assets,
            keep_asset_ids: BTreeSet::new(),
            max_similarity,
        }
    }

    pub fn asset_ids(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.id.as_str()).collect()
    }

    /// Total bytes of the members not marked as keep.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.assets
            .iter()
            .filter(|a| !self.keep_asset_ids.contains(&a.id))
            .map(|a| a.file_size)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Idle,
    Counting,
    Clustering,
    Grouping,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Idle => write!(f, "idle"),
            ScanPhase::Counting => write!(f, "counting"),
            ScanPhase::Clustering => write!(f, "clustering"),
            ScanPhase::Grouping => write!(f, "grouping"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub percent: f64,
    pub current: usize,
    pub total: usize,
    pub phase: ScanPhase,
    pub phase_label: String,
}

impl ScanProgress {
    pub fn new(current: usize, total: usize, phase: ScanPhase, label: impl Into<String>) -> Self {
        Self {
            percent: percent_of(current, total),
            current,
            total,
            phase,
            phase_label: label.into(),
        }
    }
}

/// `processed / total * 100`, clamped to 100. An empty library counts as done.
pub fn percent_of(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 * 100.0 / total as f64).min(100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authorization {
    Authorized,
    Limited,
    Denied,
}

impl Authorization {
    pub fn can_scan(&self) -> bool {
        !matches!(self, Authorization::Denied)
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authorization::Authorized => write!(f, "authorized"),
            Authorization::Limited => write!(f, "limited"),
            Authorization::Denied => write!(f, "denied"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: usize,
    pub freed_bytes: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteResult {
    pub fn succeeded(deleted_count: usize, freed_bytes: u64) -> Self {
        Self {
            deleted_count,
            freed_bytes,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            deleted_count: 0,
            freed_bytes: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// One page of the capture-time ordered asset list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPage {
    pub assets: Vec<PhotoAsset>,
    pub total: usize,
}

/// Canonical distance cutoffs. Any other threshold is accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLevel {
    VerySimilar,
    #[default]
    Similar,
    MaybeSimilar,
}

impl SimilarityLevel {
    pub const ALL: [SimilarityLevel; 3] = [
        SimilarityLevel::VerySimilar,
        SimilarityLevel::Similar,
        SimilarityLevel::MaybeSimilar,
    ];

    pub fn threshold(&self) -> f32 {
        match self {
            SimilarityLevel::VerySimilar => 0.22,
            SimilarityLevel::Similar => 0.32,
            SimilarityLevel::MaybeSimilar => 0.42,
        }
    }
}
