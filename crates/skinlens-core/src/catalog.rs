//! Static description and care advice per label, and the assembled result.

use crate::policy::Decision;
use crate::types::Label;
use serde::Serialize;

/// Fixed text attached to a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: &'static str,
    pub description: &'static str,
    pub recommendation: &'static str,
    /// Card colour accent for display.
    pub accent: Accent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    Red,
    Blue,
    Purple,
    Green,
}

const ACNE: CatalogEntry = CatalogEntry {
    title: "Acne (breakouts)",
    description: "Skin is prone to breakouts and needs oil control and anti-inflammatory care.",
    recommendation: "Benzoyl peroxide or salicylic acid gel; wash with a gentle cleanser.",
    accent: Accent::Red,
};

const HYPERPIGMENTATION: CatalogEntry = CatalogEntry {
    title: "Dark spots and uneven tone",
    description: "Dark spots caused by sun exposure or acne scarring are visible.",
    recommendation: "Vitamin C cream, niacinamide, sunscreen.",
    accent: Accent::Blue,
};

const REDNESS: CatalogEntry = CatalogEntry {
    title: "Skin redness",
    description: "Skin redness may be caused by inflammation or sensitivity.",
    recommendation: "Zinc oxide cream, aloe vera; avoid irritating ingredients.",
    accent: Accent::Purple,
};

const CLEAR: CatalogEntry = CatalogEntry {
    title: "Healthy skin",
    description: "Healthy skin with no particular concern was detected.",
    recommendation: "Gentle moisturizer and daily sunscreen.",
    accent: Accent::Green,
};

/// Look up the fixed entry for a label.
pub fn entry(label: Label) -> &'static CatalogEntry {
    match label {
        Label::Acne => &ACNE,
        Label::Hyperpigmentation => &HYPERPIGMENTATION,
        Label::Redness => &REDNESS,
        Label::Clear => &CLEAR,
    }
}

/// Final result record, serialized as the `/analyze` response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub diagnosis: Label,
    pub confidence: f32,
    pub description: &'static str,
    pub recommendation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl Analysis {
    pub fn assemble(decision: &Decision) -> Self {
        let e = entry(decision.label);
        Self {
            diagnosis: decision.label,
            confidence: decision.confidence,
            description: e.description,
            recommendation: e.recommendation,
            note: decision.advisory,
        }
    }

    pub fn card(&self) -> DiagnosisCard {
        DiagnosisCard::from(self)
    }
}

/// Display-ready view of an [`Analysis`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisCard {
    pub title: &'static str,
    /// Confidence as a percentage with two decimals, e.g. `"87.25%"`.
    pub confidence: String,
    pub description: &'static str,
    pub recommendation: &'static str,
    pub note: Option<&'static str>,
    pub accent: Accent,
}

impl From<&Analysis> for DiagnosisCard {
    fn from(a: &Analysis) -> Self {
        let e = entry(a.diagnosis);
        Self {
            title: e.title,
            confidence: format!("{:.2}%", a.confidence * 100.0),
            description: a.description,
            recommendation: a.recommendation,
            note: a.note,
            accent: e.accent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AMBIGUOUS_ADVISORY;

    fn decision(label: Label, confidence: f32, advisory: Option<&'static str>) -> Decision {
        Decision { label, confidence, top_label: label, advisory }
    }

    #[test]
    fn test_assemble_matches_catalog_for_every_label() {
        for label in Label::ALL {
            let a = Analysis::assemble(&decision(label, 0.9, None));
            assert_eq!(a.diagnosis, label);
            assert_eq!(a.description, entry(label).description);
            assert_eq!(a.recommendation, entry(label).recommendation);
            assert!(a.note.is_none());
        }
    }

    #[test]
    fn test_entries_are_distinct() {
        let descriptions: std::collections::HashSet<_> =
            Label::ALL.iter().map(|&l| entry(l).description).collect();
        assert_eq!(descriptions.len(), Label::ALL.len());
    }

    #[test]
    fn test_json_shape_without_note() {
        let a = Analysis::assemble(&decision(Label::Clear, 0.75, None));
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["diagnosis"], "clear");
        assert!((v["confidence"].as_f64().unwrap() - 0.75).abs() < 1e-6);
        assert_eq!(v["description"], CLEAR.description);
        assert_eq!(v["recommendation"], CLEAR.recommendation);
        assert!(v.get("note").is_none());
    }

    #[test]
    fn test_json_shape_with_note() {
        let a = Analysis::assemble(&decision(Label::Acne, 0.5, Some(AMBIGUOUS_ADVISORY)));
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["note"], AMBIGUOUS_ADVISORY);
    }

    #[test]
    fn test_card_formats_percentage() {
        let a = Analysis::assemble(&decision(Label::Redness, 0.87254, None));
        let card = a.card();
        assert_eq!(card.title, REDNESS.title);
        assert_eq!(card.confidence, "87.25%");
        assert_eq!(card.accent, Accent::Purple);
    }
}
