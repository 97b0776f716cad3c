//! Decision policy — turns class probabilities into a reportable label.

use crate::types::{Label, PredictionVector};
use serde::{Deserialize, Serialize};

// --- Named constants ---
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.25;
pub const DEFAULT_ADVISORY_LOW: f32 = 0.4;
pub const DEFAULT_ADVISORY_HIGH: f32 = 0.6;
pub const FALLBACK_LABEL: Label = Label::Clear;

pub const AMBIGUOUS_ADVISORY: &str =
    "Your skin may also show mild signs of other conditions. A specialist examination is recommended.";

/// Confidence floor and advisory band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    /// Predictions strictly below this are replaced by the fallback label.
    pub confidence_floor: f32,
    /// Inclusive lower bound of the ambiguous band.
    pub advisory_low: f32,
    /// Inclusive upper bound of the ambiguous band.
    pub advisory_high: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            advisory_low: DEFAULT_ADVISORY_LOW,
            advisory_high: DEFAULT_ADVISORY_HIGH,
        }
    }
}

/// Outcome of the policy for one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub label: Label,
    /// Raw top probability, reported even when the label was overridden.
    pub confidence: f32,
    /// Label the model actually ranked first.
    pub top_label: Label,
    pub advisory: Option<&'static str>,
}

impl Decision {
    pub fn overridden(&self) -> bool {
        self.label != self.top_label
    }
}

impl DecisionPolicy {
    pub fn decide(&self, prediction: &PredictionVector) -> Decision {
        let (top_label, confidence) = prediction.top();

        let label = if confidence < self.confidence_floor {
            FALLBACK_LABEL
        } else {
            top_label
        };

        let ambiguous = confidence >= self.advisory_low && confidence <= self.advisory_high;
        let advisory = (ambiguous && label != FALLBACK_LABEL).then_some(AMBIGUOUS_ADVISORY);

        Decision { label, confidence, top_label, advisory }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Prediction whose strict top entry is `label` with probability `p`.
    fn pred(label: Label, p: f32) -> PredictionVector {
        let scores: Vec<f32> = Label::ALL
            .iter()
            .map(|&l| if l == label { p } else { p / 4.0 })
            .collect();
        PredictionVector::new(&Label::ALL, &scores).unwrap()
    }

    fn decide(label: Label, p: f32) -> Decision {
        DecisionPolicy::default().decide(&pred(label, p))
    }

    #[test]
    fn test_floor_overrides_below_threshold() {
        let d = decide(Label::Redness, 0.24);
        assert_eq!(d.label, Label::Clear);
        assert_eq!(d.top_label, Label::Redness);
        assert!(d.overridden());
        assert!((d.confidence - 0.24).abs() < 1e-6);
    }

    #[test]
    fn test_floor_exclusive_at_boundary() {
        let d = decide(Label::Acne, 0.25);
        assert_eq!(d.label, Label::Acne);
        assert!(!d.overridden());
    }

    #[test]
    fn test_advisory_band_inclusive() {
        assert_eq!(decide(Label::Acne, 0.40).advisory, Some(AMBIGUOUS_ADVISORY));
        assert_eq!(decide(Label::Acne, 0.60).advisory, Some(AMBIGUOUS_ADVISORY));
        assert_eq!(decide(Label::Acne, 0.5).advisory, Some(AMBIGUOUS_ADVISORY));
    }

    #[test]
    fn test_advisory_outside_band() {
        assert_eq!(decide(Label::Acne, 0.61).advisory, None);
        assert_eq!(decide(Label::Acne, 0.39).advisory, None);
        assert_eq!(decide(Label::Hyperpigmentation, 0.95).advisory, None);
    }

    #[test]
    fn test_clear_never_gets_advisory() {
        for p in [0.40, 0.45, 0.5, 0.55, 0.60] {
            let d = decide(Label::Clear, p);
            assert_eq!(d.label, Label::Clear);
            assert_eq!(d.advisory, None, "p = {p}");
        }
    }

    #[test]
    fn test_overridden_low_confidence_has_no_advisory() {
        let d = decide(Label::Acne, 0.10);
        assert_eq!(d.label, Label::Clear);
        assert_eq!(d.advisory, None);
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = DecisionPolicy {
            confidence_floor: 0.5,
            advisory_low: 0.7,
            advisory_high: 0.8,
        };
        let d = policy.decide(&pred(Label::Redness, 0.45));
        assert_eq!(d.label, Label::Clear);
        let d = policy.decide(&pred(Label::Redness, 0.75));
        assert_eq!(d.label, Label::Redness);
        assert!(d.advisory.is_some());
    }
}
