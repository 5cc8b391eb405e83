//! Shared types for the HTTP layer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::analysis::{AnalysisResult, PlantAnalyzer};
use crate::pipeline::source::{FrameGrabber, LocalCamera, NetworkCamera, DEFAULT_CAPTURE_TIMEOUT};

/// Upload size cap for `POST /analyze`.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// File extensions accepted by `POST /analyze`.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Builds a frame grabber for a camera address.
pub type GrabberFactory = Arc<dyn Fn(&str, u16, Duration) -> Box<dyn FrameGrabber> + Send + Sync>;

/// Builds a frame grabber for a local webcam index.
pub type WebcamFactory = Arc<dyn Fn(i32, Duration) -> Box<dyn FrameGrabber> + Send + Sync>;

/// Shared context for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub analyzer: Arc<PlantAnalyzer>,
    pub captures_dir: PathBuf,
    pub capture_timeout: Duration,
    pub grabbers: GrabberFactory,
    pub webcams: WebcamFactory,
}

impl ApiContext {
    pub fn new(analyzer: Arc<PlantAnalyzer>, captures_dir: PathBuf) -> Self {
        Self {
            analyzer,
            captures_dir,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            grabbers: Arc::new(|host: &str, port: u16, timeout: Duration| {
                Box::new(NetworkCamera::new(host, port, timeout)) as Box<dyn FrameGrabber>
            }),
            webcams: Arc::new(|index: i32, timeout: Duration| {
                Box::new(LocalCamera::new(index, timeout)) as Box<dyn FrameGrabber>
            }),
        }
    }

    pub fn with_grabbers(mut self, grabbers: GrabberFactory) -> Self {
        self.grabbers = grabbers;
        self
    }

    pub fn with_webcams(mut self, webcams: WebcamFactory) -> Self {
        self.webcams = webcams;
        self
    }
}

/// Body of `POST /capture/network`. Missing fields use the camera defaults.
#[derive(Debug, Default, Deserialize)]
pub struct CaptureRequest {
    pub ip_address: Option<String>,
    pub port: Option<u16>,
}

/// Body of `POST /capture/webcam`. Defaults to the first camera.
#[derive(Debug, Default, Deserialize)]
pub struct WebcamCaptureRequest {
    pub camera_index: Option<i32>,
}

/// Analysis record plus where the captured frame was saved.
#[derive(Debug, Serialize)]
pub struct CaptureAnalysisResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub image_path: String,
}

/// Lowercased extension of an upload filename, if it is one we accept.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
