//! Remote vision-language capability: one prompt + one image in, free text out.
//!
//! Providers impose no schema on the reply. All structure comes from prompt
//! wording and client-side parsing in `pipeline::analysis`.

pub mod gemini;
pub mod ollama;

pub use gemini::*;
pub use ollama::*;

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::{AnalyzerConfig, VisionBackend};
use crate::pipeline::source::EncodedImage;

/// Errors from a vision-language call. Every variant is recoverable by the
/// caller's fallback policy.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Vision service is not reachable at {0}")]
    NotReachable(String),

    #[error("Vision service returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed vision response: {0}")]
    MalformedResponse(String),

    #[error("Vision service returned no text")]
    EmptyReply,

    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),
}

/// Vision-language client abstraction (allows mocking).
pub trait VisionClient: Send + Sync {
    fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String, VisionError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Build the client selected by configuration.
pub fn client_from_config(config: &AnalyzerConfig) -> Result<Box<dyn VisionClient>, VisionError> {
    let timeout_secs = config.timeout.as_secs();
    match &config.backend {
        VisionBackend::Gemini {
            base_url,
            api_key,
            model,
        } => Ok(Box::new(GeminiClient::new(base_url, api_key, model, timeout_secs)?)),
        VisionBackend::Ollama { base_url, model } => {
            Ok(Box::new(OllamaVisionClient::new(base_url, model, timeout_secs)?))
        }
    }
}

/// Map a reqwest transport error onto the shared taxonomy.
pub(crate) fn map_transport_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> VisionError {
    if e.is_timeout() {
        VisionError::Timeout(timeout_secs)
    } else if e.is_connect() {
        VisionError::NotReachable(base_url.to_string())
    } else {
        VisionError::Network(e.to_string())
    }
}

/// Scripted vision client for testing.
///
/// Replies are served in order; once the script runs out the last reply
/// repeats. Every prompt is recorded for inspection.
pub struct MockVisionClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockVisionClient {
    pub fn new(reply: &str) -> Self {
        Self::scripted(vec![Ok(reply.to_string())])
    }

    /// Every call fails with a network error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self::scripted(vec![Err(message.to_string())])
    }

    pub fn scripted(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts().len()
    }
}

impl VisionClient for MockVisionClient {
    fn generate(&self, prompt: &str, _image: &EncodedImage) -> Result<String, VisionError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        let reply = match next {
            Some(reply) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(reply.clone());
                }
                reply
            }
            None => self
                .last
                .lock()
                .ok()
                .and_then(|l| l.clone())
                .unwrap_or_else(|| Err("mock script empty".to_string())),
        };

        reply.map_err(VisionError::Network)
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }
}
