use std::sync::Arc;

use super::parser::interpret_narrator_reply;
use super::prompt::build_narration_prompt;
use super::types::{CropType, DiseaseNarrator, NarratorFindings};
use super::AnalysisError;
use crate::pipeline::source::LeafImage;
use crate::pipeline::vision::VisionClient;

/// Disease narrator backed by the remote vision service.
pub struct VisionDiseaseNarrator {
    client: Arc<dyn VisionClient>,
}

impl VisionDiseaseNarrator {
    pub fn new(client: Arc<dyn VisionClient>) -> Self {
        Self { client }
    }
}

impl DiseaseNarrator for VisionDiseaseNarrator {
    fn try_narrate(
        &self,
        image: &LeafImage,
        crop: &CropType,
    ) -> Result<NarratorFindings, AnalysisError> {
        let _span = tracing::info_span!(
            "narrate_disease",
            crop = %crop,
            model = %self.client.model_name(),
        )
        .entered();
        let start = std::time::Instant::now();

        let encoded = image.to_vision_jpeg()?;
        let reply = self.client.generate(&build_narration_prompt(crop), &encoded)?;
        let findings = interpret_narrator_reply(&reply);

        tracing::info!(
            health_status = %findings.health_status,
            disease = %findings.disease_name,
            elapsed_ms = %start.elapsed().as_millis(),
            "Narration parsed"
        );
        Ok(findings)
    }
}
