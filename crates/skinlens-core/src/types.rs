use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Skin condition label produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Acne,
    Hyperpigmentation,
    Redness,
    Clear,
}

impl Label {
    /// Every known label, in the serving order used when a model ships no manifest.
    pub const ALL: [Label; 4] = [
        Label::Acne,
        Label::Hyperpigmentation,
        Label::Redness,
        Label::Clear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Acne => "acne",
            Label::Hyperpigmentation => "hyperpigmentation",
            Label::Redness => "redness",
            Label::Clear => "clear",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown label: {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for Label {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .iter()
            .copied()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// Axis-aligned face rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Clip the rectangle to an image of `width` × `height`.
    ///
    /// Returns `None` when nothing of the rectangle remains inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<FaceRegion> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(FaceRegion {
            x: self.x,
            y: self.y,
            width: w,
            height: h,
        })
    }
}

/// Class probabilities, one per label, in model output order.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionVector {
    entries: Vec<(Label, f32)>,
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("model produced {scores} scores for {labels} labels")]
    LengthMismatch { labels: usize, scores: usize },
    #[error("empty prediction")]
    Empty,
}

impl PredictionVector {
    /// Pair `scores` with `labels` position by position.
    pub fn new(labels: &[Label], scores: &[f32]) -> Result<Self, PredictionError> {
        if labels.len() != scores.len() {
            return Err(PredictionError::LengthMismatch {
                labels: labels.len(),
                scores: scores.len(),
            });
        }
        if labels.is_empty() {
            return Err(PredictionError::Empty);
        }
        Ok(Self {
            entries: labels.iter().copied().zip(scores.iter().copied()).collect(),
        })
    }

    /// Highest-scoring label and its probability. The first index wins ties.
    pub fn top(&self) -> (Label, f32) {
        let mut best = self.entries[0];
        for &(label, score) in &self.entries[1..] {
            if score > best.1 {
                best = (label, score);
            }
        }
        best
    }

    /// Every label with its probability, in model output order.
    pub fn iter(&self) -> impl Iterator<Item = (Label, f32)> + '_ {
        self.entries.iter().copied()
    }
}

/// Serialized as a `{label: probability}` map in model output order.
impl Serialize for PredictionVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, score) in &self.entries {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}
