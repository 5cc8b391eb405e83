use serde::{Deserialize, Serialize};

use super::{map_transport_error, VisionClient, VisionError};
use crate::pipeline::source::EncodedImage;

/// Low temperature keeps the one-word and template answers stable.
const GEMINI_TEMPERATURE: f32 = 0.2;

/// Google Generative Language API client (`models/{model}:generateContent`).
///
/// The API key is passed in at construction and sent as the
/// `x-goog-api-key` header, never in the URL.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VisionError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Request body for `generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerationConfig {
    pub temperature: f32,
}

/// Response body from `generateContent` (only the fields we read).
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidatePart {
    pub text: Option<String>,
}

pub(crate) fn build_request(prompt: &str, image: &EncodedImage) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: prompt.to_string(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.to_string(),
                        data: image.to_base64(),
                    },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: GEMINI_TEMPERATURE,
        },
    }
}

/// Concatenate the text parts of the first candidate.
pub(crate) fn extract_text(response: GenerateContentResponse) -> Result<String, VisionError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| VisionError::MalformedResponse("No candidates in response".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(VisionError::EmptyReply);
    }
    Ok(text)
}

impl VisionClient for GeminiClient {
    fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String, VisionError> {
        let _span = tracing::info_span!(
            "gemini_generate",
            model = %self.model,
            image_size = image.bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let body = build_request(prompt, image);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
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

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| VisionError::MalformedResponse(e.to_string()))?;
        let text = extract_text(parsed)?;

        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            reply_len = text.len(),
            "Gemini reply received"
        );
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
