//! Classifier input preparation: direct resize, scale to [0, 1], batch of one.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array4, ArrayView4};
use serde::{Deserialize, Serialize};

// --- Named constants ---
pub const SERVING_INPUT_SIZE: u32 = 224;
pub const TRAINING_INPUT_SIZE: u32 = 128;
const PIXEL_SCALE: f32 = 255.0;
const CHANNELS: usize = 3;

/// Resampling filter used for the direct resize.
///
/// Must match whatever the training pipeline used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
}

impl std::str::FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            "bicubic" => Ok(Interpolation::Bicubic),
            other => Err(format!(
                "unknown interpolation {other:?} (expected nearest, bilinear or bicubic)"
            )),
        }
    }
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
        }
    }
}

/// A 1 × H × W × 3 tensor with values in [0, 1].
///
/// Only [`Preprocessor::preprocess`] builds these, so shape and range hold
/// for every instance.
#[derive(Debug, Clone)]
pub struct PreprocessedBatch {
    tensor: Array4<f32>,
}

impl PreprocessedBatch {
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.tensor.view()
    }

    pub fn shape(&self) -> [usize; 4] {
        let s = self.tensor.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn as_slice(&self) -> Option<&[f32]> {
        self.tensor.as_slice()
    }
}

/// Fixed-resolution resizer and normalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    size: u32,
    interpolation: Interpolation,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(SERVING_INPUT_SIZE, Interpolation::default())
    }
}

impl Preprocessor {
    /// `size` is clamped to at least one pixel.
    pub fn new(size: u32, interpolation: Interpolation) -> Self {
        Self { size: size.max(1), interpolation }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Resize `image` to size × size (aspect ratio not kept) and build the batch.
    pub fn preprocess(&self, image: &RgbImage) -> PreprocessedBatch {
        let side = self.size as usize;
        let mut tensor = Array4::<f32>::zeros((1, side, side, CHANNELS));

        if image.width() == 0 || image.height() == 0 {
            return PreprocessedBatch { tensor };
        }

        let resized = if image.dimensions() == (self.size, self.size) {
            image.clone()
        } else {
            imageops::resize(image, self.size, self.size, self.interpolation.filter())
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..CHANNELS {
                tensor[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / PIXEL_SCALE;
            }
        }

        PreprocessedBatch { tensor }
    }
}
