//! SeetaFace funnel-structured cascade via `rustface`.

use crate::face::{CascadeParams, FaceCascade, FaceError};
use crate::types::FaceRegion;
use image::GrayImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

// rustface panics outside these ranges.
const MIN_FACE_SIZE_FLOOR: u32 = 20;
const MIN_PYRAMID_STEP: f32 = 0.01;
const MAX_PYRAMID_STEP: f32 = 0.99;
const MIN_SCORE_THRESH: f64 = 0.5;
const SLIDE_WINDOW_STEP: u32 = 4;

/// Cascade backed by the bundled SeetaFace frontal model.
pub struct RustfaceCascade {
    model: rustface::Model,
}

impl RustfaceCascade {
    /// Load the SeetaFace model file (`seeta_fd_frontal_v1.0.bin`).
    pub fn load(path: &Path) -> Result<Self, FaceError> {
        if !path.exists() {
            return Err(FaceError::CascadeNotFound(path.display().to_string()));
        }
        let model = rustface::read_model(BufReader::new(File::open(path)?))?;
        tracing::info!(path = %path.display(), "loaded face cascade");
        Ok(Self { model })
    }
}

/// Translate generic cascade knobs into rustface detector settings.
///
/// Returns (min_face_size, pyramid_step, score_thresh).
fn detector_settings(params: &CascadeParams) -> (u32, f32, f64) {
    let min_face = params.min_size.max(MIN_FACE_SIZE_FLOOR);
    let step = if params.scale_factor > 1.0 {
        (1.0 / params.scale_factor).clamp(MIN_PYRAMID_STEP, MAX_PYRAMID_STEP)
    } else {
        MAX_PYRAMID_STEP
    };
    let thresh = (params.min_neighbors as f64).max(MIN_SCORE_THRESH);
    (min_face, step, thresh)
}

impl FaceCascade for RustfaceCascade {
    fn detect(&mut self, gray: &GrayImage, params: &CascadeParams) -> Vec<FaceRegion> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let (min_face, step, thresh) = detector_settings(params);
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(min_face);
        detector.set_pyramid_scale_factor(step);
        detector.set_score_thresh(thresh);
        detector.set_slide_window_step(SLIDE_WINDOW_STEP, SLIDE_WINDOW_STEP);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let x = bbox.x().max(0) as u32;
                let y = bbox.y().max(0) as u32;
                // Boxes may start left of / above the frame; shrink by the overhang.
                let dx = (x as i64 - bbox.x() as i64) as u32;
                let dy = (y as i64 - bbox.y() as i64) as u32;
                FaceRegion {
                    x,
                    y,
                    width: bbox.width().saturating_sub(dx),
                    height: bbox.height().saturating_sub(dy),
                }
            })
            .filter(|r| r.width > 0 && r.height > 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let (min_face, step, thresh) = detector_settings(&CascadeParams::default());
        assert_eq!(min_face, 60);
        assert!((step - 1.0 / 1.1).abs() < 1e-6);
        assert!((thresh - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_settings_respect_backend_limits() {
        let params = CascadeParams {
            scale_factor: 1.0,
            min_neighbors: 0,
            min_size: 5,
        };
        let (min_face, step, thresh) = detector_settings(&params);
        assert_eq!(min_face, MIN_FACE_SIZE_FLOOR);
        assert_eq!(step, MAX_PYRAMID_STEP);
        assert_eq!(thresh, MIN_SCORE_THRESH);
    }

    #[test]
    fn test_load_missing_model() {
        let err = RustfaceCascade::load(Path::new("/nonexistent/seeta.bin"))
            .err()
            .expect("missing file must fail");
        assert!(matches!(err, FaceError::CascadeNotFound(_)));
    }
}
