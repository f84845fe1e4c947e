use fast_image_resize::{self as fir, images::Image as FirImage};
use image::DynamicImage;

use super::EmbeddingModel;
use crate::domain::FeaturePrint;
use crate::error::{Error, Result};

pub const MODEL_ID: &str = "perceptual-gray16-v2";

const SIDE: u32 = 16;
const DIMENSIONS: usize = (SIDE * SIDE) as usize;

/// Built-in embedding: a 16x16 grayscale thumbnail, mean-centred and L2-normalised
/// into a 256-d unit vector.
///
/// Distances between unit vectors fall in [0, 2]. Re-encodes and mild exposure
/// changes of the same frame land well under 0.2; unrelated scenes sit above 1.0,
/// which puts the stock 0.22/0.32/0.42 cutoffs in a usable range.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerceptualModel;

impl PerceptualModel {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingModel for PerceptualModel {
    fn model_id(&self) -> &str {
        MODEL_ID
    }

    fn embed(&self, image: &DynamicImage) -> Result<FeaturePrint> {
        let gray = downsample_gray(image)?;
        normalize(&gray)
            .map(FeaturePrint::new)
            .ok_or_else(|| Error::Embedding("image is uniform".to_string()))
    }
}

/// SIMD-resize RGB to 16x16, then convert only those pixels to grayscale (BT.601).
fn downsample_gray(image: &DynamicImage) -> Result<Vec<f32>> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::Embedding("image has no pixels".to_string()));
    }

    let src = FirImage::from_vec_u8(w, h, rgb.into_raw(), fir::PixelType::U8x3)
        .map_err(|e| Error::Embedding(e.to_string()))?;
    let mut dst = FirImage::new(SIDE, SIDE, fir::PixelType::U8x3);
    fir::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| Error::Embedding(e.to_string()))?;

    let buf = dst.buffer();
    let gray = (0..DIMENSIONS)
        .map(|i| {
            let r = buf[i * 3] as f32;
            let g = buf[i * 3 + 1] as f32;
            let b = buf[i * 3 + 2] as f32;
            0.299 * r + 0.587 * g + 0.114 * b
        })
        .collect();
    Ok(gray)
}

/// Mean-centre and scale to unit length. A flat image has no direction and
/// yields `None`.
fn normalize(values: &[f32]) -> Option<Vec<f32>> {
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let centred: Vec<f32> = values.iter().map(|v| v - mean).collect();
    let norm = centred.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return None;
    }
    Some(centred.into_iter().map(|v| v / norm).collect())
}
