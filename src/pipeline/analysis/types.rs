use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AnalysisError, ClassifierError};
use crate::pipeline::source::LeafImage;

/// Top-level fallback when a request fails outright.
pub const ANALYSIS_ERROR_DISEASE: &str = "analysis error";
pub const ANALYSIS_ERROR_TREATMENT: &str =
    "An error occurred during analysis. Please try again with a clearer image of the plant.";

/// Narrator fallback when the vision call itself fails.
pub const NARRATION_ERROR_DISEASE: &str = "error analyzing image";
pub const NARRATION_ERROR_TREATMENT: &str =
    "Unable to provide recommendations due to analysis error";

/// Sentinel crop name when identification fails.
pub const UNKNOWN_CROP: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Diseased,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Diseased => "diseased",
            Self::Unknown => "unknown",
        }
    }

    /// Exact match on the two decisive values only.
    pub fn from_decisive(value: &str) -> Option<Self> {
        match value {
            "healthy" => Some(Self::Healthy),
            "diseased" => Some(Self::Diseased),
            _ => None,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record returned for every analysis request.
///
/// All four fields are always populated. `health_status == Unknown` is the
/// only signal a caller needs to detect a degraded result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub crop_name: String,
    pub health_status: HealthStatus,
    pub disease_name: String,
    pub treatment_recommendations: String,
}

impl AnalysisResult {
    /// Record substituted when anything in the pipeline fails.
    pub fn fallback() -> Self {
        Self {
            crop_name: UNKNOWN_CROP.to_string(),
            health_status: HealthStatus::Unknown,
            disease_name: ANALYSIS_ERROR_DISEASE.to_string(),
            treatment_recommendations: ANALYSIS_ERROR_TREATMENT.to_string(),
        }
    }

    pub fn from_findings(crop: &CropType, findings: NarratorFindings) -> Self {
        Self {
            crop_name: crop.to_string(),
            health_status: findings.health_status,
            disease_name: findings.disease_name,
            treatment_recommendations: findings.treatment_recommendations,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.health_status == HealthStatus::Unknown
    }
}

/// Narrator output: everything in `AnalysisResult` except the crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarratorFindings {
    pub health_status: HealthStatus,
    pub disease_name: String,
    pub treatment_recommendations: String,
}

impl NarratorFindings {
    pub fn error_fallback() -> Self {
        Self {
            health_status: HealthStatus::Unknown,
            disease_name: NARRATION_ERROR_DISEASE.to_string(),
            treatment_recommendations: NARRATION_ERROR_TREATMENT.to_string(),
        }
    }
}

/// Crops the local classifier was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedCrop {
    Maize,
    Tomato,
    Cassava,
    Cashew,
}

impl SupportedCrop {
    pub const ALL: [SupportedCrop; 4] = [Self::Maize, Self::Tomato, Self::Cassava, Self::Cashew];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maize => "maize",
            Self::Tomato => "tomato",
            Self::Cassava => "cassava",
            Self::Cashew => "cashew",
        }
    }

    /// Parse a normalized (lowercase, single-token) crop name. Only the
    /// four exact names match; synonyms such as `corn` stay free-form.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "maize" => Some(Self::Maize),
            "tomato" => Some(Self::Tomato),
            "cassava" => Some(Self::Cassava),
            "cashew" => Some(Self::Cashew),
            _ => None,
        }
    }
}

impl fmt::Display for SupportedCrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crop identified for one request. Decides which analysis path runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropType {
    Supported(SupportedCrop),
    Other(String),
}

impl CropType {
    /// Build from a normalized crop token.
    pub fn from_name(name: &str) -> Self {
        match SupportedCrop::parse(name) {
            Some(crop) => Self::Supported(crop),
            None => Self::Other(name.to_string()),
        }
    }

    pub fn unknown() -> Self {
        Self::Other(UNKNOWN_CROP.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Other(name) if name == UNKNOWN_CROP)
    }

    pub fn supported(&self) -> Option<SupportedCrop> {
        match self {
            Self::Supported(crop) => Some(*crop),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for CropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supported(crop) => f.write_str(crop.as_str()),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Raw label emitted by the local classifier, e.g. `maize_streak_virus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPrediction(pub String);

impl RawPrediction {
    pub fn label(&self) -> &str {
        &self.0
    }
}

// ──── Capability seams ────

/// Names the crop in a leaf photo. Never fails: returns `CropType::unknown()`.
pub trait CropIdentifier: Send + Sync {
    fn identify(&self, image: &LeafImage) -> CropType;
}

/// Pretrained classifier over the supported crops.
pub trait LocalClassifier: Send + Sync {
    fn classify(&self, image: &LeafImage) -> Result<RawPrediction, ClassifierError>;
}

/// Hands out the local classifier if it could be loaded.
pub trait ClassifierProvider: Send + Sync {
    fn acquire(&self) -> Option<Arc<dyn LocalClassifier>>;
}

/// Produces health status, disease name and treatment for a leaf.
pub trait DiseaseNarrator: Send + Sync {
    fn try_narrate(
        &self,
        image: &LeafImage,
        crop: &CropType,
    ) -> Result<NarratorFindings, AnalysisError>;

    /// Like `try_narrate`, but call failures become the error fallback record.
    fn narrate(&self, image: &LeafImage, crop: &CropType) -> NarratorFindings {
        match self.try_narrate(image, crop) {
            Ok(findings) => findings,
            Err(e) => {
                tracing::warn!(crop = %crop, error = %e, "Disease narration failed");
                NarratorFindings::error_fallback()
            }
        }
    }
}
