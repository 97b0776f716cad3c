//! Face locator — crops the most prominent face before classification.
//!
//! The image is downscaled, converted to luminance and histogram-equalized,
//! then handed to a pluggable cascade detector. The largest candidate wins.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- Named constants ---
pub const DETECTION_DOWNSCALE: f32 = 0.75;
pub const DEFAULT_SCALE_FACTOR: f32 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 3;
pub const DEFAULT_MIN_SIZE: u32 = 60;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("cascade model not found: {0} — place seeta_fd_frontal_v1.0.bin in the model directory")]
    CascadeNotFound(String),
    #[error("failed to load cascade model: {0}")]
    CascadeLoad(#[from] std::io::Error),
}

/// Sensitivity knobs for the multi-scale cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeParams {
    /// Ratio between successive pyramid levels (> 1.0).
    pub scale_factor: f32,
    /// Minimum supporting evidence for a candidate to survive.
    pub min_neighbors: u32,
    /// Smallest face edge, in pixels of the downscaled image.
    pub min_size: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

/// A sliding-window face detector over a grayscale image.
pub trait FaceCascade: Send {
    /// Return candidate face rectangles in detector order.
    fn detect(&mut self, gray: &GrayImage, params: &CascadeParams) -> Vec<FaceRegion>;
}

/// Result of running the locator: a crop or an explicit absence.
#[derive(Debug, Clone)]
pub enum FaceOutcome {
    Found {
        /// Region in coordinates of the downscaled image.
        region: FaceRegion,
        crop: RgbImage,
    },
    NotFound,
}

/// What the pipeline does with the locator's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacePolicy {
    /// Never run the locator; classify the whole image.
    Skip,
    /// Classify the face crop when one is found, the whole image otherwise.
    #[default]
    Fallback,
    /// Reject uploads in which no face is found.
    Require,
}

impl FacePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacePolicy::Skip => "skip",
            FacePolicy::Fallback => "fallback",
            FacePolicy::Require => "require",
        }
    }
}

impl fmt::Display for FacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "off" | "none" => Ok(FacePolicy::Skip),
            "fallback" => Ok(FacePolicy::Fallback),
            "require" | "required" => Ok(FacePolicy::Require),
            other => Err(format!(
                "unknown face policy {other:?} (expected skip, fallback or require)"
            )),
        }
    }
}

/// Downscale → luminance → equalize → cascade → largest box → crop.
pub struct FaceLocator {
    cascade: Box<dyn FaceCascade>,
    params: CascadeParams,
}

impl FaceLocator {
    pub fn new(cascade: Box<dyn FaceCascade>, params: CascadeParams) -> Self {
        Self { cascade, params }
    }

    pub fn params(&self) -> &CascadeParams {
        &self.params
    }

    pub fn locate(&mut self, image: &RgbImage) -> FaceOutcome {
        let small = downscale(image, DETECTION_DOWNSCALE);
        if small.width() == 0 || small.height() == 0 {
            return FaceOutcome::NotFound;
        }

        let mut gray = imageops::grayscale(&small);
        equalize_histogram(&mut gray);

        let candidates = self.cascade.detect(&gray, &self.params);
        tracing::debug!(candidates = candidates.len(), "cascade finished");

        let Some(region) = largest_region(&candidates)
            .and_then(|r| r.clamp_to(small.width(), small.height()))
        else {
            return FaceOutcome::NotFound;
        };

        let crop = imageops::crop_imm(&small, region.x, region.y, region.width, region.height)
            .to_image();
        tracing::debug!(?region, "face located");
        FaceOutcome::Found { region, crop }
    }
}

/// Scale both dimensions by `factor` with bilinear filtering.
fn downscale(image: &RgbImage, factor: f32) -> RgbImage {
    let w = (image.width() as f32 * factor).round() as u32;
    let h = (image.height() as f32 * factor).round() as u32;
    if w == 0 || h == 0 {
        return RgbImage::new(0, 0);
    }
    imageops::resize(image, w, h, FilterType::Triangle)
}

/// Pick the candidate with the largest area. The earliest candidate wins ties.
pub fn largest_region(candidates: &[FaceRegion]) -> Option<FaceRegion> {
    let mut best: Option<FaceRegion> = None;
    for c in candidates {
        match best {
            Some(b) if c.area() <= b.area() => {}
            _ => best = Some(*c),
        }
    }
    best
}

/// Global histogram equalization in-place.
///
/// Builds the cumulative histogram and remaps each level so the output
/// spreads across 0–255. Uniform images are left untouched.
pub fn equalize_histogram(gray: &mut GrayImage) {
    let total = gray.as_raw().len();
    if total == 0 {
        return;
    }

    let mut hist = [0u32; 256];
    for &p in gray.as_raw() {
        hist[p as usize] += 1;
    }

    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = total as u32 - cdf_min;
    if denom == 0 {
        return;
    }

    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let scaled = (cdf[i].saturating_sub(cdf_min)) as f32 / denom as f32 * 255.0;
        *v = scaled.round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    /// Cascade that returns a fixed candidate list.
    struct FixedCascade {
        boxes: Vec<FaceRegion>,
    }

    impl FaceCascade for FixedCascade {
        fn detect(&mut self, _gray: &GrayImage, _params: &CascadeParams) -> Vec<FaceRegion> {
            self.boxes.clone()
        }
    }

    fn region(x: u32, y: u32, w: u32, h: u32) -> FaceRegion {
        FaceRegion { x, y, width: w, height: h }
    }

    #[test]
    fn test_largest_region_picks_max_area() {
        let boxes = [region(0, 0, 10, 10), region(50, 50, 20, 20)];
        assert_eq!(largest_region(&boxes), Some(region(50, 50, 20, 20)));
    }

    #[test]
    fn test_largest_region_tie_keeps_first() {
        let boxes = [region(0, 0, 10, 40), region(5, 5, 20, 20)];
        assert_eq!(largest_region(&boxes), Some(region(0, 0, 10, 40)));
    }

    #[test]
    fn test_largest_region_empty() {
        assert_eq!(largest_region(&[]), None);
    }

    #[test]
    fn test_locate_no_candidates_is_not_found() {
        let cascade = FixedCascade { boxes: vec![] };
        let mut locator = FaceLocator::new(Box::new(cascade), CascadeParams::default());
        let img = RgbImage::from_pixel(200, 200, Rgb([120, 90, 80]));
        assert!(matches!(locator.locate(&img), FaceOutcome::NotFound));
    }

    #[test]
    fn test_locate_crops_largest_from_downscaled() {
        let cascade = FixedCascade {
            boxes: vec![region(10, 10, 10, 10), region(40, 40, 20, 20)],
        };
        let mut locator = FaceLocator::new(Box::new(cascade), CascadeParams::default());
        let img = RgbImage::from_pixel(200, 100, Rgb([10, 20, 30]));

        match locator.locate(&img) {
            FaceOutcome::Found { region: r, crop } => {
                assert_eq!(r, region(40, 40, 20, 20));
                assert_eq!(crop.dimensions(), (20, 20));
            }
            FaceOutcome::NotFound => panic!("expected a face"),
        }
    }

    #[test]
    fn test_locate_runs_cascade_on_downscaled_image() {
        struct Probe(std::sync::Arc<std::sync::Mutex<Option<(u32, u32)>>>);
        impl FaceCascade for Probe {
            fn detect(&mut self, gray: &GrayImage, _: &CascadeParams) -> Vec<FaceRegion> {
                *self.0.lock().unwrap() = Some(gray.dimensions());
                vec![]
            }
        }

        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let mut locator = FaceLocator::new(Box::new(Probe(seen.clone())), CascadeParams::default());
        locator.locate(&RgbImage::new(400, 200));
        assert_eq!(*seen.lock().unwrap(), Some((300, 150)));
    }

    #[test]
    fn test_locate_clips_box_outside_image() {
        let cascade = FixedCascade { boxes: vec![region(60, 60, 50, 50)] };
        let mut locator = FaceLocator::new(Box::new(cascade), CascadeParams::default());
        let img = RgbImage::new(100, 100); // downscaled to 75x75

        match locator.locate(&img) {
            FaceOutcome::Found { region: r, crop } => {
                assert_eq!(r, region(60, 60, 15, 15));
                assert_eq!(crop.dimensions(), (15, 15));
            }
            FaceOutcome::NotFound => panic!("expected a clipped face"),
        }
    }

    #[test]
    fn test_equalize_stretches_low_contrast() {
        let mut gray = GrayImage::from_fn(16, 16, |x, _| Luma([100 + (x % 4) as u8]));
        equalize_histogram(&mut gray);
        let min = gray.iter().copied().min().unwrap();
        let max = gray.iter().copied().max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_equalize_uniform_untouched() {
        let mut gray = GrayImage::from_pixel(8, 8, Luma([77]));
        equalize_histogram(&mut gray);
        assert!(gray.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_face_policy_parse() {
        assert_eq!("Require".parse::<FacePolicy>().unwrap(), FacePolicy::Require);
        assert_eq!("off".parse::<FacePolicy>().unwrap(), FacePolicy::Skip);
        assert!("sometimes".parse::<FacePolicy>().is_err());
        assert_eq!(FacePolicy::default(), FacePolicy::Fallback);
    }
}
