//! Skin condition classifier via ONNX Runtime.
//!
//! The model takes a 1×H×W×3 float batch in [0, 1] and outputs one softmax
//! probability per label, in the order recorded by the model manifest.

use crate::manifest::{ManifestError, ModelManifest};
use crate::preprocess::PreprocessedBatch;
use crate::types::{Label, PredictionError, PredictionVector};
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use thiserror::Error;

/// The classifier consumes RGB batches.
const INPUT_CHANNELS: i64 = 3;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — export the trained classifier to ONNX and place it in model/")]
    ModelNotFound(String),
    #[error("manifest: {0}")]
    Manifest(#[from] ManifestError),
    #[error("model does not match its manifest: {0}")]
    ShapeMismatch(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("prediction: {0}")]
    Prediction(#[from] PredictionError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that maps a preprocessed batch to per-label probabilities.
pub trait Classifier: Send {
    /// Labels in output order.
    fn labels(&self) -> &[Label];

    fn classify(&mut self, batch: &PreprocessedBatch) -> Result<PredictionVector, ClassifierError>;
}

/// ONNX-backed classifier.
pub struct OnnxClassifier {
    session: Session,
    manifest: ModelManifest,
}

impl OnnxClassifier {
    /// Load the model and its manifest sidecar, rejecting a manifest whose
    /// geometry or label count disagrees with the model's declared tensors.
    pub fn load_with_threads(
        model_path: &Path,
        intra_threads: usize,
    ) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let manifest = ModelManifest::load_for(model_path)?;

        let session = Session::builder()?
            .with_intra_threads(intra_threads.max(1))
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            labels = ?manifest.labels,
            "loaded skin classifier"
        );

        let input = session.inputs().first().and_then(|i| tensor_dims(i.dtype()));
        let output = session
            .outputs()
            .first()
            .map(|o| tensor_dims(o.dtype()))
            .ok_or_else(|| ClassifierError::ShapeMismatch("model declares no outputs".into()))?;
        check_geometry(input.as_deref(), output.as_deref(), &manifest)?;

        Ok(Self { session, manifest })
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }
}

impl Classifier for OnnxClassifier {
    fn labels(&self) -> &[Label] {
        &self.manifest.labels
    }

    fn classify(&mut self, batch: &PreprocessedBatch) -> Result<PredictionVector, ClassifierError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(batch.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("class scores: {e}")))?;

        Ok(PredictionVector::new(&self.manifest.labels, scores)?)
    }
}

fn tensor_dims(ty: &ValueType) -> Option<Vec<i64>> {
    match ty {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

/// A dim that is unknown until run time (`-1`, or `0` in some exports).
fn fixed(dim: i64) -> Option<i64> {
    (dim > 0).then_some(dim)
}

/// Compare declared NHWC input dims and `[N, classes]` output dims with the manifest.
/// Dynamic axes match anything.
fn check_geometry(
    input: Option<&[i64]>,
    output: Option<&[i64]>,
    manifest: &ModelManifest,
) -> Result<(), ClassifierError> {
    if let Some(dims) = input {
        if dims.len() != 4 {
            return Err(ClassifierError::ShapeMismatch(format!(
                "input has rank {}, expected NHWC rank 4 ({dims:?})",
                dims.len()
            )));
        }
        let size = i64::from(manifest.input_size);
        for (axis, dim) in [("height", dims[1]), ("width", dims[2])] {
            if let Some(d) = fixed(dim).filter(|&d| d != size) {
                return Err(ClassifierError::ShapeMismatch(format!(
                    "input {axis} is {d}, manifest input_size is {size}"
                )));
            }
        }
        if let Some(c) = fixed(dims[3]).filter(|&c| c != INPUT_CHANNELS) {
            return Err(ClassifierError::ShapeMismatch(format!(
                "input has {c} channels, expected {INPUT_CHANNELS}"
            )));
        }
    }

    if let Some(classes) = output.and_then(|dims| dims.last().copied()).and_then(fixed) {
        let labels = manifest.labels.len() as i64;
        if classes != labels {
            return Err(ClassifierError::ShapeMismatch(format!(
                "model outputs {classes} classes, manifest lists {labels} labels"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(labels: &[Label], input_size: u32) -> ModelManifest {
        ModelManifest { labels: labels.to_vec(), input_size, ..Default::default() }
    }

    #[test]
    fn test_geometry_matches() {
        let m = manifest(&Label::ALL, 224);
        check_geometry(Some(&[1, 224, 224, 3]), Some(&[1, 4]), &m).unwrap();
        // Dynamic batch and spatial axes.
        check_geometry(Some(&[-1, -1, -1, 3]), Some(&[-1, 4]), &m).unwrap();
        // No tensor info at all.
        check_geometry(None, None, &m).unwrap();
    }

    #[test]
    fn test_geometry_label_count_mismatch() {
        let m = manifest(&[Label::Acne, Label::Redness, Label::Clear], 224);
        let err = check_geometry(Some(&[1, 224, 224, 3]), Some(&[1, 4]), &m).unwrap_err();
        assert!(matches!(err, ClassifierError::ShapeMismatch(_)));
        assert!(err.to_string().contains("4 classes"));
    }

    #[test]
    fn test_geometry_input_size_mismatch() {
        let m = manifest(&Label::ALL, 224);
        let err = check_geometry(Some(&[1, 128, 128, 3]), Some(&[1, 4]), &m).unwrap_err();
        assert!(err.to_string().contains("height is 128"));
    }

    #[test]
    fn test_geometry_rejects_nchw() {
        let m = manifest(&Label::ALL, 224);
        let err = check_geometry(Some(&[1, 3, 224, 224]), Some(&[1, 4]), &m).unwrap_err();
        assert!(matches!(err, ClassifierError::ShapeMismatch(_)));

        let err = check_geometry(Some(&[1, 224, 224]), Some(&[1, 4]), &m).unwrap_err();
        assert!(err.to_string().contains("rank 3"));
    }

    #[test]
    fn test_load_missing_model() {
        let err = OnnxClassifier::load_with_threads(Path::new("/nonexistent/skin_model.onnx"), 1)
            .err()
            .expect("missing model must fail");
        assert!(matches!(err, ClassifierError::ModelNotFound(_)));
    }

    #[test]
    fn test_score_count_mismatch_is_error() {
        // Mirrors the check run on every inference result.
        let manifest = ModelManifest::default();
        let err: ClassifierError = PredictionVector::new(&manifest.labels, &[0.2, 0.8])
            .unwrap_err()
            .into();
        assert!(err.to_string().contains("2 scores for 4 labels"));
    }
}
