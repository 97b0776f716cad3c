//! Model manifest — the label order and input geometry a model was trained with.
//!
//! Stored as a JSON sidecar next to the ONNX file (`skin_model.onnx` →
//! `skin_model.json`) so the serving side never has to guess the class order.

use crate::preprocess::{Interpolation, SERVING_INPUT_SIZE};
use crate::types::{Label, UnknownLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest lists no labels")]
    NoLabels,
    #[error("label {0} listed more than once")]
    DuplicateLabel(Label),
    #[error("manifest must include the fallback label \"clear\"")]
    MissingFallback,
    #[error("manifest input_size must be at least 1")]
    ZeroInputSize,
    #[error("dataset directory {0}: {1}")]
    Dataset(String, UnknownLabel),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Class labels in model output order.
    pub labels: Vec<Label>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub interpolation: Interpolation,
}

fn default_input_size() -> u32 {
    SERVING_INPUT_SIZE
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            labels: Label::ALL.to_vec(),
            input_size: SERVING_INPUT_SIZE,
            interpolation: Interpolation::default(),
        }
    }
}

/// Sidecar path for a model file.
pub fn manifest_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("json")
}

impl ModelManifest {
    /// Load the sidecar for `model_path`, or fall back to the built-in label order.
    pub fn load_for(model_path: &Path) -> Result<Self, ManifestError> {
        let path = manifest_path(model_path);
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                labels = ?Label::ALL,
                "no model manifest; assuming default label order"
            );
            return Ok(Self::default());
        }
        Self::read(&path)
    }

    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: ModelManifest =
            serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        manifest.validate()?;
        tracing::info!(path = %path.display(), labels = ?manifest.labels, "loaded model manifest");
        Ok(manifest)
    }

    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        self.validate()?;
        let io_err = |source| ManifestError::Io { path: path.display().to_string(), source };
        let mut text = serde_json::to_string_pretty(self).map_err(|e| io_err(e.into()))?;
        text.push('\n');
        std::fs::write(path, text).map_err(io_err)
    }

    /// Derive the label order from a training dataset: one subfolder per class,
    /// class index = position in sorted folder-name order.
    pub fn from_dataset_dir(dir: &Path) -> Result<Self, ManifestError> {
        let display = dir.display().to_string();
        let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Io {
            path: display.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ManifestError::Io {
                path: display.clone(),
                source,
            })?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let labels = names
            .iter()
            .map(|n| n.parse::<Label>().map_err(|e| ManifestError::Dataset(display.clone(), e)))
            .collect::<Result<Vec<_>, _>>()?;

        let manifest = Self { labels, ..Self::default() };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.labels.is_empty() {
            return Err(ManifestError::NoLabels);
        }
        let mut seen = HashSet::new();
        for &label in &self.labels {
            if !seen.insert(label) {
                return Err(ManifestError::DuplicateLabel(label));
            }
        }
        if !seen.contains(&Label::Clear) {
            return Err(ManifestError::MissingFallback);
        }
        if self.input_size == 0 {
            return Err(ManifestError::ZeroInputSize);
        }
        Ok(())
    }
}
