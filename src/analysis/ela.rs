use std::io::Cursor;

use image::{DynamicImage, RgbImage, codecs::jpeg::JpegEncoder};
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    error::{ForensicsError, Result},
    image_utils::DEFAULT_TARGET_SIZE,
};

pub const DEFAULT_ELA_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ElaStatus {
    Computed,
    /// The engine could not run; the map is all zeros and says nothing about integrity.
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct ElaResult {
    /// Rescaled absolute difference, full source resolution.
    pub map: RgbImage,
    /// Mean of `map` over every pixel and channel.
    pub score: f64,
    /// Largest raw difference before rescaling.
    pub max_difference: u8,
    /// Mean raw difference before rescaling.
    pub mean_residual: f64,
    pub status: ElaStatus,
}

impl ElaResult {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            map: RgbImage::new(DEFAULT_TARGET_SIZE.width, DEFAULT_TARGET_SIZE.height),
            score: 0.0,
            max_difference: 0,
            mean_residual: 0.0,
            status: ElaStatus::Fallback {
                reason: reason.into(),
            },
        }
    }

    pub fn is_informative(&self) -> bool {
        self.status == ElaStatus::Computed
    }

    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        self.map.save(path)?;
        Ok(())
    }
}

pub struct ElaAnalyzer {
    quality: u8,
    parallel: bool,
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Runs ELA on raw bytes. Never fails: any error yields the all-zero fallback.
    pub fn analyze(&self, bytes: &[u8]) -> ElaResult {
        match self.try_analyze(bytes) {
            Ok(result) => result,
            Err(e) => {
                warn!("ELA fell back to an empty map: {}", e);
                ElaResult::fallback(e.to_string())
            }
        }
    }

    pub fn try_analyze(&self, bytes: &[u8]) -> Result<ElaResult> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| ForensicsError::Ela(format!("decode failed: {}", e)))?;
        self.analyze_image(&image)
    }

    pub fn analyze_image(&self, image: &DynamicImage) -> Result<ElaResult> {
        if !(1..=100).contains(&self.quality) {
            return Err(ForensicsError::InvalidParameter(format!(
                "ELA quality must be within 1-100, got {}",
                self.quality
            )));
        }

        let original = image.to_rgb8();
        let recompressed = self.recompress_jpeg(&original)?;
        self.compare(&original, &recompressed)
    }

    /// Difference and rescale step, exposed for already-decoded rasters.
    pub fn compare(&self, original: &RgbImage, recompressed: &RgbImage) -> Result<ElaResult> {
        if original.dimensions() != recompressed.dimensions() {
            return Err(ForensicsError::Ela(format!(
                "dimension mismatch: {:?} vs {:?}",
                original.dimensions(),
                recompressed.dimensions()
            )));
        }

        let (width, height) = original.dimensions();
        let differences = self.absolute_difference(original.as_raw(), recompressed.as_raw());

        let max_difference = differences.iter().copied().max().unwrap_or(0);
        let divisor = if max_difference == 0 { 1 } else { max_difference };

        let rescaled = differences
            .iter()
            .map(|&d| rescale(d, divisor))
            .collect::<Vec<u8>>();

        let count = rescaled.len().max(1) as f64;
        let mean_residual = differences.iter().map(|&d| d as f64).sum::<f64>() / count;
        let score = rescaled.iter().map(|&v| v as f64).sum::<f64>() / count;

        let map = RgbImage::from_raw(width, height, rescaled)
            .ok_or_else(|| ForensicsError::Ela("difference buffer has wrong length".into()))?;

        debug!(
            "ELA q{}: max diff {}, residual {:.3}, score {:.3}",
            self.quality, max_difference, mean_residual, score
        );

        Ok(ElaResult {
            map,
            score,
            max_difference,
            mean_residual,
            status: ElaStatus::Computed,
        })
    }

    fn recompress_jpeg(&self, original: &RgbImage) -> Result<RgbImage> {
        let mut buffer = Cursor::new(Vec::new());

        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        DynamicImage::ImageRgb8(original.clone())
            .write_with_encoder(encoder)
            .map_err(|e| ForensicsError::Ela(format!("re-encode failed: {}", e)))?;

        let recompressed = image::load_from_memory(&buffer.into_inner())
            .map_err(|e| ForensicsError::Ela(format!("re-decode failed: {}", e)))?;

        Ok(recompressed.to_rgb8())
    }

    fn absolute_difference(&self, original: &[u8], recompressed: &[u8]) -> Vec<u8> {
        if self.parallel {
            original
                .par_iter()
                .zip(recompressed.par_iter())
                .map(|(a, b)| a.abs_diff(*b))
                .collect()
        } else {
            original
                .iter()
                .zip(recompressed.iter())
                .map(|(a, b)| a.abs_diff(*b))
                .collect()
        }
    }
}

impl Default for ElaAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_ELA_QUALITY)
    }
}

/// `round(value * 255 / divisor)` in integer arithmetic.
///
/// `value <= divisor` always holds so the result never exceeds 255; the
/// `min` is a safety clamp only.
fn rescale(value: u8, divisor: u8) -> u8 {
    let divisor = divisor as u32;
    let scaled = (value as u32 * 255 + divisor / 2) / divisor;
    scaled.min(255) as u8
}
