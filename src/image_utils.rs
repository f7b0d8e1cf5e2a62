//! Decoding and model-input preparation.
//!
//! Raw upload bytes are sniffed, decoded, canonicalised to 8-bit RGB and
//! resized once. Both the display raster and the model tensor are built from
//! that single resized raster so they always show the same pixels.

use image::{DynamicImage, ImageFormat, RgbImage, imageops::FilterType};
use log::debug;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{ForensicsError, Result};

pub const DEFAULT_TARGET_SIZE: TargetSize = TargetSize {
    width: 224,
    height: 224,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl Default for TargetSize {
    fn default() -> Self {
        DEFAULT_TARGET_SIZE
    }
}

/// Channel-wise `(value - mean) / std` applied on the 0-255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// EfficientNet-family models rescale internally and take raw 0-255 input.
    pub const PASSTHROUGH: Normalization = Normalization {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    pub const IMAGENET: Normalization = Normalization {
        mean: [123.675, 116.28, 103.53],
        std: [58.395, 57.12, 57.375],
    };

    pub fn apply(&self, value: u8, channel: usize) -> f32 {
        (value as f32 - self.mean[channel]) / self.std[channel]
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::PASSTHROUGH
    }
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub source_width: u32,
    pub source_height: u32,
    /// Resized RGB raster for presentation.
    pub raster: RgbImage,
    /// `[1, height, width, 3]` model input.
    pub tensor: Array4<f32>,
}

pub struct ImageDecoder {
    target: TargetSize,
    normalization: Normalization,
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self {
            target: DEFAULT_TARGET_SIZE,
            normalization: Normalization::default(),
        }
    }

    pub fn with_target_size(mut self, target: TargetSize) -> Self {
        self.target = target;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        if self.target.width == 0 || self.target.height == 0 {
            return Err(ForensicsError::InvalidParameter(
                "target size must be non-zero".into(),
            ));
        }

        let (format, image) = load_image(bytes)?;
        let rgb = image.to_rgb8();
        let (source_width, source_height) = rgb.dimensions();

        let raster = image::imageops::resize(
            &rgb,
            self.target.width,
            self.target.height,
            FilterType::Triangle,
        );
        let tensor = to_tensor(&raster, &self.normalization);

        debug!(
            "decoded {:?} {}x{} -> {}x{}",
            format, source_width, source_height, self.target.width, self.target.height
        );

        Ok(DecodedImage {
            format,
            source_width,
            source_height,
            raster,
            tensor,
        })
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sniffs and decodes JPEG or PNG bytes. Anything else is a decode failure.
pub fn load_image(bytes: &[u8]) -> Result<(ImageFormat, DynamicImage)> {
    if bytes.is_empty() {
        return Err(ForensicsError::Decode("empty buffer".into()));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| ForensicsError::Decode(format!("unrecognised image data: {}", e)))?;

    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(ForensicsError::Decode(format!(
            "unsupported format {:?}, expected JPEG or PNG",
            format
        )));
    }

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ForensicsError::Decode(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(ForensicsError::Decode("image has no pixels".into()));
    }

    Ok((format, image))
}

pub fn to_tensor(raster: &RgbImage, normalization: &Normalization) -> Array4<f32> {
    let (width, height) = raster.dimensions();

    Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| normalization.apply(raster.get_pixel(x as u32, y as u32)[c], c),
    )
}

#[cfg(test)]
pub(crate) mod test_images {
    use std::io::Cursor;

    use image::{
        DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage,
        codecs::jpeg::JpegEncoder,
    };

    pub fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) % 256) as u8,
            ])
        })
    }

    /// Deterministic high-frequency content that JPEG cannot reproduce.
    pub fn noisy(width: u32, height: u32) -> RgbImage {
        let mut state = 0x2545_f491_u32;
        RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            };
            Rgb([next(), next(), next()])
        })
    }

    pub fn flat(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    pub fn gray(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([(x % 256) as u8]))
    }

    pub fn rgba(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128]))
    }

    pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    pub fn jpeg_bytes(image: &RgbImage, quality: u8) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        DynamicImage::ImageRgb8(image.clone())
            .write_with_encoder(encoder)
            .unwrap();
        buffer
    }
}
