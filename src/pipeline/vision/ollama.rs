use serde::{Deserialize, Serialize};

use super::{map_transport_error, VisionClient, VisionError};
use crate::pipeline::source::EncodedImage;

/// Ollama `/api/chat` client for local vision models (LLaVA, Gemma 3, ...).
///
/// Chat-template vision models expect the messages format; `/api/generate`
/// rejects images for several of them.
pub struct OllamaVisionClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaVisionClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VisionError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }
}

/// Chat-based vision request for `/api/chat`.
#[derive(Debug, Serialize)]
pub(crate) struct VisionChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<VisionChatMessage<'a>>,
    pub stream: bool,
    pub options: VisionChatOptions,
}

#[derive(Debug, Serialize)]
pub(crate) struct VisionChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
    /// Base64-encoded images (user messages only).
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VisionChatOptions {
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VisionChatResponse {
    pub message: Option<VisionChatReply>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VisionChatReply {
    #[serde(default)]
    pub content: String,
}

impl VisionClient for OllamaVisionClient {
    fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String, VisionError> {
        let _span = tracing::info_span!(
            "ollama_vision_chat",
            model = %self.model,
            image_size = image.bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let url = format!("{}/api/chat", self.base_url);
        let body = VisionChatRequest {
            model: &self.model,
            messages: vec![VisionChatMessage {
                role: "user",
                content: prompt,
                images: vec![image.to_base64()],
            }],
            stream: false,
            options: VisionChatOptions { temperature: 0.2 },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| map_transport_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(VisionError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: VisionChatResponse = response
            .json()
            .map_err(|e| VisionError::MalformedResponse(e.to_string()))?;

        let text = parsed.message.map(|m| m.content).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(VisionError::EmptyReply);
        }

        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            reply_len = text.len(),
            "Ollama vision reply received"
        );
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
