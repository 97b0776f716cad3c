//! End-to-end analysis: decode → locate face → preprocess → classify → decide → assemble.

use crate::cascade::RustfaceCascade;
use crate::catalog::Analysis;
use crate::classifier::{Classifier, ClassifierError, OnnxClassifier};
use crate::decode::{decode_image, DecodeError};
use crate::face::{CascadeParams, FaceError, FaceLocator, FaceOutcome, FacePolicy};
use crate::policy::DecisionPolicy;
use crate::preprocess::{Interpolation, Preprocessor};
use crate::types::{FaceRegion, Label, PredictionVector};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

/// Per-request failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid image: {0}")]
    Decode(#[from] DecodeError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Startup failures.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("face locator: {0}")]
    Face(#[from] FaceError),
}

/// Everything needed to build a [`Pipeline`] from files on disk.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub model_path: PathBuf,
    pub cascade_path: PathBuf,
    pub face_policy: FacePolicy,
    pub cascade: CascadeParams,
    pub decision: DecisionPolicy,
    pub intra_threads: usize,
}

/// How the face stage resolved for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceStage {
    Skipped,
    Cropped(FaceRegion),
    /// No face found; the whole image was classified.
    FellBack,
}

/// Analysis plus the diagnostics callers may want to log or display.
#[derive(Debug, Clone)]
pub struct Report {
    pub analysis: Analysis,
    pub face: FaceStage,
    pub top_label: Label,
    /// Raw class probabilities, before the decision policy.
    pub scores: PredictionVector,
}

pub struct Pipeline {
    preprocessor: Preprocessor,
    classifier: Box<dyn Classifier>,
    locator: Option<FaceLocator>,
    face_policy: FacePolicy,
    decision: DecisionPolicy,
}

impl Pipeline {
    /// Pipeline without a face stage.
    pub fn new(
        preprocessor: Preprocessor,
        classifier: Box<dyn Classifier>,
        decision: DecisionPolicy,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            locator: None,
            face_policy: FacePolicy::Skip,
            decision,
        }
    }

    /// Attach a face locator. A `Skip` policy drops the locator.
    pub fn with_face_locator(mut self, locator: FaceLocator, policy: FacePolicy) -> Self {
        if policy == FacePolicy::Skip {
            self.locator = None;
        } else {
            tracing::info!(%policy, params = ?locator.params(), "face stage enabled");
            self.locator = Some(locator);
        }
        self.face_policy = policy;
        self
    }

    /// Load the ONNX classifier, its manifest and (unless skipped) the cascade.
    pub fn load(opts: &LoadOptions) -> Result<Self, LoadError> {
        let classifier = OnnxClassifier::load_with_threads(&opts.model_path, opts.intra_threads)?;
        let manifest = classifier.manifest().clone();
        let preprocessor = Preprocessor::new(manifest.input_size, manifest.interpolation);

        let pipeline = Self::new(preprocessor, Box::new(classifier), opts.decision);
        if opts.face_policy == FacePolicy::Skip {
            tracing::info!("face stage disabled");
            return Ok(pipeline);
        }

        let cascade = RustfaceCascade::load(&opts.cascade_path)?;
        let locator = FaceLocator::new(Box::new(cascade), opts.cascade);
        Ok(pipeline.with_face_locator(locator, opts.face_policy))
    }

    pub fn labels(&self) -> &[Label] {
        self.classifier.labels()
    }

    pub fn input_size(&self) -> u32 {
        self.preprocessor.size()
    }

    pub fn interpolation(&self) -> Interpolation {
        self.preprocessor.interpolation()
    }

    pub fn face_policy(&self) -> FacePolicy {
        self.face_policy
    }

    /// Analyze raw upload bytes.
    pub fn analyze_bytes(&mut self, bytes: &[u8]) -> Result<Report, PipelineError> {
        let image = decode_image(bytes)?;
        self.analyze_image(&image)
    }

    /// Analyze an already decoded image.
    pub fn analyze_image(&mut self, image: &RgbImage) -> Result<Report, PipelineError> {
        let located;
        let (target, face) = match self.locator.as_mut() {
            None => (image, FaceStage::Skipped),
            Some(locator) => match locator.locate(image) {
                FaceOutcome::Found { region, crop } => {
                    located = crop;
                    (&located, FaceStage::Cropped(region))
                }
                FaceOutcome::NotFound if self.face_policy == FacePolicy::Require => {
                    return Err(PipelineError::NoFaceDetected);
                }
                FaceOutcome::NotFound => (image, FaceStage::FellBack),
            },
        };

        let batch = self.preprocessor.preprocess(target);
        let prediction = self.classifier.classify(&batch)?;
        let decision = self.decision.decide(&prediction);

        tracing::debug!(
            top = %decision.top_label,
            label = %decision.label,
            confidence = decision.confidence,
            overridden = decision.overridden(),
            ?face,
            "classified"
        );

        Ok(Report {
            analysis: Analysis::assemble(&decision),
            face,
            top_label: decision.top_label,
            scores: prediction,
        })
    }
}
