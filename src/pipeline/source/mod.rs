//! Image Source Adapter. Turns a path, URL, byte buffer or networked
//! camera into a decoded, orientation-corrected RGB leaf image.

pub mod capture;
pub mod leaf_image;
pub mod webcam;

pub use capture::*;
pub use leaf_image::*;
pub use webcam::*;

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to download image from {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Camera capture failed: {0}")]
    Capture(String),
}

/// Where a leaf image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Interpret a user-supplied location: `http(s)://` is a URL,
    /// anything else a filesystem path.
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    /// Short description for logs (never includes raw bytes).
    pub fn describe(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Url(u) => u.clone(),
            Self::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

/// Loads images from any `ImageSource`.
pub struct ImageLoader {
    client: reqwest::blocking::Client,
}

impl ImageLoader {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::ImageProcessing(format!("HTTP client init failed: {e}")))?;
        Ok(Self { client })
    }

    /// Read the raw bytes behind a source.
    pub fn read_bytes(&self, source: &ImageSource) -> Result<Vec<u8>, SourceError> {
        match source {
            ImageSource::Path(path) => Ok(std::fs::read(path)?),
            ImageSource::Url(url) => self.download(url),
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    /// Read, validate and decode a source into a `LeafImage`.
    pub fn load(&self, source: &ImageSource) -> Result<LeafImage, SourceError> {
        let _span = tracing::debug_span!("load_image", source = %source.describe()).entered();
        let bytes = self.read_bytes(source)?;
        LeafImage::decode(&bytes)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let download_err = |reason: String| SourceError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| download_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_err(format!("HTTP {}", status.as_u16())));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_IMAGE_BYTES as u64 {
                return Err(download_err(format!(
                    "image is {len} bytes, limit is {MAX_IMAGE_BYTES}"
                )));
            }
        }

        read_capped(response, MAX_IMAGE_BYTES).map_err(|e| match e {
            SourceError::Io(io) => download_err(io.to_string()),
            other => other,
        })
    }
}

/// Read at most `limit` bytes; a longer stream is rejected without
/// buffering the excess.
pub fn read_capped<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, SourceError> {
    let mut bytes = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(SourceError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            limit / (1024 * 1024)
        )));
    }
    Ok(bytes)
}
