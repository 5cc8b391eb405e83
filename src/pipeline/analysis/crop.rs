use std::sync::Arc;

use super::prompt::build_crop_prompt;
use super::types::{CropIdentifier, CropType};
use crate::pipeline::source::LeafImage;
use crate::pipeline::vision::VisionClient;

/// Crop identifier backed by the remote vision service.
pub struct VisionCropIdentifier {
    client: Arc<dyn VisionClient>,
}

impl VisionCropIdentifier {
    pub fn new(client: Arc<dyn VisionClient>) -> Self {
        Self { client }
    }
}

impl CropIdentifier for VisionCropIdentifier {
    fn identify(&self, image: &LeafImage) -> CropType {
        let _span = tracing::info_span!("identify_crop", model = %self.client.model_name()).entered();

        let encoded = match image.to_vision_jpeg() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode image for crop identification");
                return CropType::unknown();
            }
        };

        let reply = match self.client.generate(&build_crop_prompt(), &encoded) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Crop identification failed");
                return CropType::unknown();
            }
        };

        match normalize_crop_reply(&reply) {
            Some(name) => {
                let crop = CropType::from_name(&name);
                tracing::info!(crop = %crop, "Crop identified");
                crop
            }
            None => {
                tracing::warn!("Crop identification returned no usable word");
                CropType::unknown()
            }
        }
    }
}

/// Lowercase first word of a reply, with surrounding punctuation removed.
pub fn normalize_crop_reply(reply: &str) -> Option<String> {
    let lower = reply.trim().to_lowercase();
    let first = lower.split_whitespace().next()?;
    let word = first.trim_matches(|c: char| !c.is_alphanumeric());
    if word.is_empty() {
        None
    } else {
        Some(word.to_string())
    }
}
