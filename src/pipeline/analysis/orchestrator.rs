//! Analysis orchestrator: the single entry point of the pipeline.
//!
//! Flow per request:
//! 1. load and decode the image
//! 2. identify the crop (never fails, may be `unknown`)
//! 3. supported crop with a loaded classifier: classifier decides health and
//!    disease, narrator only supplies treatment for diseased leaves
//! 4. anything else: narrator decides everything
//!
//! Errors and panics never leave `analyze`; they become the fallback record.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::classifier::CachedClassifierProvider;
use super::crop::VisionCropIdentifier;
use super::labels::{crop_in_label, interpret_label, LabelVerdict};
use super::narrator::VisionDiseaseNarrator;
use super::parser::NO_DISEASE;
use super::types::{
    AnalysisResult, ClassifierProvider, CropIdentifier, CropType, DiseaseNarrator, HealthStatus,
    SupportedCrop,
};
use super::AnalysisError;
use crate::config::AnalyzerConfig;
use crate::pipeline::source::{ImageLoader, ImageSource, LeafImage};
use crate::pipeline::vision::{client_from_config, VisionClient};

/// Care list when the classifier reports a healthy leaf.
pub const CLASSIFIER_HEALTHY_CARE: &str = "1. Continue regular watering according to crop needs\n\
     2. Maintain appropriate sunlight exposure\n\
     3. Apply balanced fertilizer as needed";

/// Which component decided health and disease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPath {
    Classifier,
    Narrator,
}

impl AnalysisPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Narrator => "narrator",
        }
    }
}

pub struct PlantAnalyzer {
    loader: ImageLoader,
    crop_identifier: Box<dyn CropIdentifier>,
    classifiers: Box<dyn ClassifierProvider>,
    narrator: Box<dyn DiseaseNarrator>,
}

impl PlantAnalyzer {
    pub fn new(
        loader: ImageLoader,
        crop_identifier: Box<dyn CropIdentifier>,
        classifiers: Box<dyn ClassifierProvider>,
        narrator: Box<dyn DiseaseNarrator>,
    ) -> Self {
        Self {
            loader,
            crop_identifier,
            classifiers,
            narrator,
        }
    }

    /// Crop identifier and narrator share one vision client.
    pub fn with_vision_client(
        client: Arc<dyn VisionClient>,
        classifiers: Box<dyn ClassifierProvider>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        Ok(Self::new(
            ImageLoader::new(timeout)?,
            Box::new(VisionCropIdentifier::new(client.clone())),
            classifiers,
            Box::new(VisionDiseaseNarrator::new(client)),
        ))
    }

    /// Production wiring from configuration.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let client: Arc<dyn VisionClient> = Arc::from(client_from_config(config)?);
        tracing::info!(
            model = %client.model_name(),
            classifier_dir = %config.classifier_dir.display(),
            "Plant analyzer configured"
        );
        Self::with_vision_client(
            client,
            Box::new(CachedClassifierProvider::new(config.classifier_dir.clone())),
            config.timeout,
        )
    }

    /// Analyze the image at a local path.
    pub fn analyze(&self, image_path: impl AsRef<Path>) -> AnalysisResult {
        self.analyze_source(&ImageSource::Path(image_path.as_ref().to_path_buf()))
    }

    /// Analyze an image from any source. Never fails.
    pub fn analyze_source(&self, source: &ImageSource) -> AnalysisResult {
        let request_id = Uuid::new_v4();
        let _span = tracing::info_span!(
            "analyze",
            request_id = %request_id,
            source = %source.describe(),
        )
        .entered();

        self.guarded(|| {
            let image = self.loader.load(source)?;
            Ok(self.run(&image))
        })
    }

    /// Analyze an already decoded image. Never fails.
    pub fn analyze_image(&self, image: &LeafImage) -> AnalysisResult {
        let request_id = Uuid::new_v4();
        let _span = tracing::info_span!("analyze", request_id = %request_id).entered();

        self.guarded(|| Ok(self.run(image)))
    }

    /// Run `step`, converting errors and panics into the fallback record.
    fn guarded<F>(&self, step: F) -> AnalysisResult
    where
        F: FnOnce() -> Result<AnalysisResult, AnalysisError>,
    {
        let start = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(step)).unwrap_or_else(|payload| {
            Err(AnalysisError::Panicked(panic_message(payload.as_ref())))
        });

        match outcome {
            Ok(result) => {
                tracing::info!(
                    crop = %result.crop_name,
                    health_status = %result.health_status,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "Analysis complete"
                );
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "Analysis failed, returning fallback record");
                AnalysisResult::fallback()
            }
        }
    }

    fn run(&self, image: &LeafImage) -> AnalysisResult {
        let crop = self.crop_identifier.identify(image);

        let classified = crop.supported().and_then(|supported| {
            let classifier = self.classifiers.acquire()?;
            match classifier.classify(image) {
                Ok(prediction) => Some((supported, prediction)),
                Err(e) => {
                    tracing::warn!(crop = %crop, error = %e, "Classifier failed, using narrator");
                    None
                }
            }
        });

        let path = if classified.is_some() {
            AnalysisPath::Classifier
        } else {
            AnalysisPath::Narrator
        };
        tracing::info!(crop = %crop, path = path.as_str(), "Analysis path chosen");

        match classified {
            Some((supported, prediction)) => {
                if let Some(named) = crop_in_label(prediction.label()) {
                    if named != supported {
                        tracing::warn!(
                            crop = %supported,
                            label = %prediction.label(),
                            "Classifier label names a different crop"
                        );
                    }
                }
                let verdict = interpret_label(&prediction, supported);
                self.resolve_verdict(image, &crop, supported, verdict)
            }
            None => AnalysisResult::from_findings(&crop, self.narrator.narrate(image, &crop)),
        }
    }

    fn resolve_verdict(
        &self,
        image: &LeafImage,
        crop: &CropType,
        supported: SupportedCrop,
        verdict: LabelVerdict,
    ) -> AnalysisResult {
        match verdict {
            LabelVerdict::Healthy => AnalysisResult {
                crop_name: supported.to_string(),
                health_status: HealthStatus::Healthy,
                disease_name: NO_DISEASE.to_string(),
                treatment_recommendations: CLASSIFIER_HEALTHY_CARE.to_string(),
            },
            LabelVerdict::Diseased { disease_name } => {
                // Only the narrator's treatment text is used here. A failed
                // call carries the narrator's error treatment through.
                let treatment_recommendations =
                    self.narrator.narrate(image, crop).treatment_recommendations;

                AnalysisResult {
                    crop_name: supported.to_string(),
                    health_status: HealthStatus::Diseased,
                    disease_name,
                    treatment_recommendations,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::classifier::{MockClassifier, StaticClassifierProvider};
    use crate::pipeline::analysis::types::{
        ANALYSIS_ERROR_DISEASE, ANALYSIS_ERROR_TREATMENT, NARRATION_ERROR_DISEASE,
        NARRATION_ERROR_TREATMENT,
    };
    use crate::pipeline::vision::MockVisionClient;
    use image::{Rgb, RgbImage};

    const HEALTHY_REPLY: &str =
        "health_status: healthy\ndisease_name: none\ntreatment: 1. Water regularly";
    const BLIGHT_REPLY: &str = "health_status: diseased\ndisease_name: leaf blight\ntreatment:\n1. Remove leaves\n2. Apply fungicide";

    fn leaf() -> LeafImage {
        LeafImage::from_rgb(RgbImage::from_pixel(48, 48, Rgb([60, 160, 70])))
    }

    fn build_analyzer(
        client: Arc<MockVisionClient>,
        classifiers: StaticClassifierProvider,
    ) -> PlantAnalyzer {
        PlantAnalyzer::with_vision_client(client, Box::new(classifiers), Duration::from_secs(1))
            .unwrap()
    }

    fn script(replies: &[Result<&str, &str>]) -> Arc<MockVisionClient> {
        Arc::new(MockVisionClient::scripted(
            replies
                .iter()
                .map(|r| match r {
                    Ok(reply) => Ok(reply.to_string()),
                    Err(message) => Err(message.to_string()),
                })
                .collect(),
        ))
    }

    fn assert_invariants(result: &AnalysisResult) {
        assert!(!result.crop_name.is_empty());
        assert!(!result.disease_name.is_empty());
        assert!(!result.treatment_recommendations.is_empty());
        match result.health_status {
            HealthStatus::Healthy => assert_eq!(result.disease_name, "none"),
            HealthStatus::Diseased => assert_ne!(result.disease_name, "none"),
            HealthStatus::Unknown => {}
        }
    }

    // ──── Classifier path ────

    #[test]
    fn classifier_healthy_label_skips_narrator() {
        let client = script(&[Ok("maize")]);
        let classifier = Arc::new(MockClassifier::new("maize_healthy"));
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::available(classifier.clone()));

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(result.crop_name, "maize");
        assert_eq!(result.health_status, HealthStatus::Healthy);
        assert_eq!(result.disease_name, "none");
        assert_eq!(result.treatment_recommendations, CLASSIFIER_HEALTHY_CARE);
        assert_eq!(classifier.call_count(), 1);
        assert_eq!(client.call_count(), 1);
        assert_invariants(&result);
    }

    #[test]
    fn classifier_disease_label_uses_narrator_for_treatment_only() {
        // Narrator claims healthy; classifier verdict must win.
        let client = script(&[
            Ok("maize"),
            Ok("health_status: healthy\ndisease_name: none\ntreatment:\n1. Rogue infected plants\n2. Control leafhoppers"),
        ]);
        let classifier = Arc::new(MockClassifier::new("maize_streak_virus"));
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::available(classifier.clone()));

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(result.health_status, HealthStatus::Diseased);
        assert!(result.disease_name.contains("streak_virus"));
        assert!(!result.disease_name.contains("maize"));
        assert_eq!(
            result.treatment_recommendations,
            "1. Rogue infected plants\n2. Control leafhoppers"
        );
        assert_eq!(client.call_count(), 2);
        assert!(client.prompts()[1].contains("This is a maize plant"));
        assert_invariants(&result);
    }

    #[test]
    fn classifier_disease_with_narrator_failure_keeps_error_treatment() {
        let client = script(&[Ok("maize"), Err("timeout")]);
        let classifier = Arc::new(MockClassifier::new("maize_streak_virus"));
        let analyzer = build_analyzer(client, StaticClassifierProvider::available(classifier));

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(result.crop_name, "maize");
        assert_eq!(result.health_status, HealthStatus::Diseased);
        assert!(result.disease_name.contains("streak_virus"));
        assert_eq!(result.treatment_recommendations, NARRATION_ERROR_TREATMENT);
        assert_invariants(&result);
    }

    #[test]
    fn corn_reply_goes_to_narrator_under_its_own_name() {
        let client = script(&[Ok("Corn"), Ok(BLIGHT_REPLY)]);
        let classifier = Arc::new(MockClassifier::new("maize_healthy"));
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::available(classifier.clone()));

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(classifier.call_count(), 0);
        assert_eq!(result.crop_name, "corn");
        assert_eq!(result.health_status, HealthStatus::Diseased);
        assert_eq!(result.disease_name, "leaf blight");
        assert_eq!(client.call_count(), 2);
    }

    // ──── Narrator path ────

    #[test]
    fn unsupported_crop_never_touches_classifier() {
        let client = script(&[Ok("wheat"), Ok(BLIGHT_REPLY)]);
        let classifier = Arc::new(MockClassifier::new("maize_healthy"));
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::available(classifier.clone()));

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(classifier.call_count(), 0);
        assert_eq!(result.crop_name, "wheat");
        assert_eq!(result.health_status, HealthStatus::Diseased);
        assert_eq!(result.disease_name, "leaf blight");
        assert_eq!(result.treatment_recommendations, "1. Remove leaves\n2. Apply fungicide");
        assert_invariants(&result);
    }

    #[test]
    fn supported_crop_without_classifier_uses_narrator() {
        let client = script(&[Ok("cassava"), Ok(HEALTHY_REPLY)]);
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::unavailable());

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(result.crop_name, "cassava");
        assert_eq!(result.health_status, HealthStatus::Healthy);
        assert_eq!(result.treatment_recommendations, "1. Water regularly");
        assert_eq!(client.call_count(), 2);
    }

    #[test]
    fn classifier_error_falls_back_to_narrator() {
        let client = script(&[Ok("cashew"), Ok(HEALTHY_REPLY)]);
        let classifier = Arc::new(MockClassifier::failing("bad tensor"));
        let analyzer = build_analyzer(client, StaticClassifierProvider::available(classifier.clone()));

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(classifier.call_count(), 1);
        assert_eq!(result.health_status, HealthStatus::Healthy);
        assert_eq!(result.crop_name, "cashew");
    }

    #[test]
    fn narrator_failure_yields_fixed_triple() {
        let client = script(&[Ok("wheat"), Err("connection reset")]);
        let analyzer = build_analyzer(client, StaticClassifierProvider::unavailable());

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(result.crop_name, "wheat");
        assert_eq!(result.health_status, HealthStatus::Unknown);
        assert_eq!(result.disease_name, NARRATION_ERROR_DISEASE);
        assert_eq!(result.treatment_recommendations, NARRATION_ERROR_TREATMENT);
    }

    #[test]
    fn crop_failure_continues_as_unknown() {
        let client = script(&[Err("offline"), Ok(HEALTHY_REPLY)]);
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::unavailable());

        let result = analyzer.analyze_image(&leaf());

        assert_eq!(result.crop_name, "unknown");
        assert_eq!(result.health_status, HealthStatus::Healthy);
        assert!(client.prompts()[1].contains("This is a unknown plant"));
    }

    #[test]
    fn everything_failing_still_returns_complete_record() {
        let client = Arc::new(MockVisionClient::failing("down"));
        let analyzer = build_analyzer(client, StaticClassifierProvider::unavailable());

        let result = analyzer.analyze_image(&leaf());
        assert_eq!(result.health_status, HealthStatus::Unknown);
        assert_invariants(&result);
    }

    // ──── Top-level fallback ────

    #[test]
    fn missing_file_returns_fallback_record() {
        let client = script(&[Ok("maize")]);
        let analyzer = build_analyzer(client.clone(), StaticClassifierProvider::unavailable());

        let result = analyzer.analyze("/no/such/leaf.jpg");

        assert_eq!(result, AnalysisResult::fallback());
        assert_eq!(result.disease_name, ANALYSIS_ERROR_DISEASE);
        assert_eq!(result.treatment_recommendations, ANALYSIS_ERROR_TREATMENT);
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn undecodable_bytes_return_fallback_record() {
        let analyzer = build_analyzer(script(&[Ok("maize")]), StaticClassifierProvider::unavailable());
        let result = analyzer.analyze_source(&ImageSource::Bytes(b"not an image at all".repeat(10)));
        assert!(result.is_fallback());
        assert_eq!(result.crop_name, "unknown");
    }

    struct PanickingIdentifier;

    impl CropIdentifier for PanickingIdentifier {
        fn identify(&self, _image: &LeafImage) -> CropType {
            panic!("identifier exploded");
        }
    }

    #[test]
    fn panic_is_caught_and_becomes_fallback() {
        let client = script(&[Ok(HEALTHY_REPLY)]);
        let analyzer = PlantAnalyzer::new(
            ImageLoader::new(Duration::from_secs(1)).unwrap(),
            Box::new(PanickingIdentifier),
            Box::new(StaticClassifierProvider::unavailable()),
            Box::new(VisionDiseaseNarrator::new(client)),
        );

        assert_eq!(analyzer.analyze_image(&leaf()), AnalysisResult::fallback());
    }

    #[test]
    fn analyze_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        RgbImage::from_pixel(64, 64, Rgb([50, 170, 60])).save(&path).unwrap();

        let client = script(&[Ok("tomato"), Ok(HEALTHY_REPLY)]);
        let analyzer = build_analyzer(client, StaticClassifierProvider::unavailable());

        let result = analyzer.analyze(&path);
        assert_eq!(result.crop_name, "tomato");
        assert_eq!(result.health_status, HealthStatus::Healthy);
        assert_invariants(&result);
    }

    #[test]
    fn invariants_hold_across_reply_shapes() {
        let replies = [
            "health_status: healthy\ndisease_name: rust",
            "health_status: diseased\ndisease_name: none",
            "health_status: maybe\ndisease_name: mosaic",
            "no template at all",
            "",
        ];
        for reply in replies {
            let client = script(&[Ok("orange"), Ok(reply)]);
            let analyzer = build_analyzer(client, StaticClassifierProvider::unavailable());
            let result = analyzer.analyze_image(&leaf());
            assert_invariants(&result);
        }
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
