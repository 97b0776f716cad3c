//! skinlens-core — Skin condition analysis engine.
//!
//! Crops the face with a SeetaFace cascade, resizes and normalizes it, runs
//! an ONNX classifier and maps the result onto a fixed diagnosis catalog.

pub mod cascade;
pub mod catalog;
pub mod classifier;
pub mod decode;
pub mod face;
pub mod manifest;
pub mod pipeline;
pub mod policy;
pub mod preprocess;
pub mod types;

pub use catalog::{Analysis, DiagnosisCard};
pub use classifier::{Classifier, ClassifierError, OnnxClassifier};
pub use face::{CascadeParams, FaceCascade, FaceLocator, FacePolicy};
pub use manifest::ModelManifest;
pub use pipeline::{FaceStage, LoadError, LoadOptions, Pipeline, PipelineError, Report};
pub use policy::{Decision, DecisionPolicy};
pub use preprocess::{PreprocessedBatch, Preprocessor};
pub use types::{FaceRegion, Label, PredictionVector};

use std::path::PathBuf;

/// Default directory holding `skin_model.onnx`, its manifest and the cascade model.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("model")
}
