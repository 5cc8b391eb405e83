//! Interpretation of local classifier labels.
//!
//! Classifier labels encode crop, health and disease in one string
//! (`maize_healthy`, `Corn___Common_rust`, `tomato late blight`). The crop
//! part is removed through an explicit alias table rather than by
//! subtracting whatever name the crop identifier happened to return.

use std::sync::LazyLock;

use regex::Regex;

use super::parser::UNIDENTIFIED_DISEASE;
use super::types::{RawPrediction, SupportedCrop};

/// Spellings of each supported crop that may appear inside a label.
const CROP_LABEL_ALIASES: &[(SupportedCrop, &[&str])] = &[
    (SupportedCrop::Maize, &["maize", "corn"]),
    (SupportedCrop::Tomato, &["tomato"]),
    (SupportedCrop::Cassava, &["cassava"]),
    (SupportedCrop::Cashew, &["cashew"]),
];

const SEPARATORS: &[char] = &['_', '-', ' ', '(', ')', ',', '.'];

/// A run of two or more separators collapses to its first character.
static SEPARATOR_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([_\s-])[_\s-]+").expect("valid separator regex")
});

/// What a classifier label says about the leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelVerdict {
    Healthy,
    Diseased { disease_name: String },
}

/// Read a classifier label for a leaf of the given crop.
pub fn interpret_label(prediction: &RawPrediction, crop: SupportedCrop) -> LabelVerdict {
    let lower = prediction.label().to_lowercase();

    if lower.contains("healthy") {
        return LabelVerdict::Healthy;
    }

    LabelVerdict::Diseased {
        disease_name: disease_from_label(&lower, crop),
    }
}

/// Remove every alias of `crop` from `label` and tidy the separators.
pub fn disease_from_label(label: &str, crop: SupportedCrop) -> String {
    let mut stripped = label.to_lowercase();
    for alias in aliases_for(crop) {
        stripped = stripped.replace(alias, "");
    }

    let collapsed = SEPARATOR_RUN.replace_all(&stripped, "$1");
    let disease = collapsed.trim_matches(|c: char| SEPARATORS.contains(&c) || c.is_whitespace());

    if disease.is_empty() {
        UNIDENTIFIED_DISEASE.to_string()
    } else {
        disease.to_string()
    }
}

/// The supported crop a label names, if any.
///
/// Used to spot a classifier that disagrees with the crop identifier.
pub fn crop_in_label(label: &str) -> Option<SupportedCrop> {
    let lower = label.to_lowercase();
    CROP_LABEL_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|alias| lower.contains(alias)))
        .map(|(crop, _)| *crop)
}

fn aliases_for(crop: SupportedCrop) -> &'static [&'static str] {
    CROP_LABEL_ALIASES
        .iter()
        .find(|(c, _)| *c == crop)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}
