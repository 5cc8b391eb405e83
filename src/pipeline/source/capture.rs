//! Single-frame capture from a networked phone camera.
//!
//! DroidCam-style apps serve an MJPEG stream at `http://<ip>:<port>/video`.
//! A frame is every byte from a JPEG start-of-image marker (`FF D8`) to the
//! next end-of-image marker (`FF D9`). We read the stream until the first
//! complete frame arrives, the deadline passes, or the read cap is hit.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::SourceError;

pub const DEFAULT_CAMERA_HOST: &str = "192.168.1.2";
pub const DEFAULT_CAMERA_PORT: u16 = 4747;
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Stop reading a stream that never yields a frame.
const MAX_STREAM_BYTES: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Anything that can hand back one encoded still frame.
pub trait FrameGrabber: Send + Sync {
    fn grab_frame(&self) -> Result<Vec<u8>, SourceError>;

    /// Grab a frame and write it to `dir/<prefix>_<unix-ts>.jpg`.
    fn capture_to(&self, dir: &Path, prefix: &str) -> Result<PathBuf, SourceError> {
        let frame = self.grab_frame()?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{prefix}_{}.jpg", chrono::Utc::now().timestamp()));
        std::fs::write(&path, &frame)?;
        tracing::info!(path = %path.display(), bytes = frame.len(), "Frame captured");
        Ok(path)
    }
}

/// Phone camera reachable over the local network.
#[derive(Debug, Clone)]
pub struct NetworkCamera {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Default for NetworkCamera {
    fn default() -> Self {
        Self::new(DEFAULT_CAMERA_HOST, DEFAULT_CAMERA_PORT, DEFAULT_CAPTURE_TIMEOUT)
    }
}

impl NetworkCamera {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.trim().to_string(),
            port,
            timeout,
        }
    }

    pub fn stream_url(&self) -> String {
        format!("http://{}:{}/video", self.host, self.port)
    }
}

impl FrameGrabber for NetworkCamera {
    fn grab_frame(&self) -> Result<Vec<u8>, SourceError> {
        let url = self.stream_url();
        let _span = tracing::info_span!("network_capture", url = %url).entered();

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|e| SourceError::Capture(format!("HTTP client init failed: {e}")))?;

        let mut response = client
            .get(&url)
            .send()
            .map_err(|e| SourceError::Capture(format!("Could not connect to camera at {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(SourceError::Capture(format!(
                "Camera at {url} answered HTTP {}",
                response.status().as_u16()
            )));
        }

        let deadline = Instant::now() + self.timeout;
        read_first_frame(&mut response, deadline)
    }
}

/// Read from an MJPEG stream until one whole JPEG frame is buffered.
pub fn read_first_frame<R: Read>(stream: &mut R, deadline: Instant) -> Result<Vec<u8>, SourceError> {
    let mut buffer = Vec::with_capacity(READ_CHUNK * 4);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        if Instant::now() > deadline {
            return Err(SourceError::Capture("Timeout: no frame received".into()));
        }

        let read = stream
            .read(&mut chunk)
            .map_err(|e| SourceError::Capture(format!("Failed to read camera stream: {e}")))?;
        if read == 0 {
            return Err(SourceError::Capture(
                "Camera stream ended before a full frame arrived".into(),
            ));
        }
        buffer.extend_from_slice(&chunk[..read]);

        if let Some((start, end)) = find_jpeg_frame(&buffer) {
            return Ok(buffer[start..end].to_vec());
        }

        if buffer.len() > MAX_STREAM_BYTES {
            return Err(SourceError::Capture(format!(
                "No JPEG frame found in first {}MB of stream",
                MAX_STREAM_BYTES / (1024 * 1024)
            )));
        }
    }
}

/// Locate the first complete JPEG in `buf`. Returns `[start, end)`.
pub fn find_jpeg_frame(buf: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(buf, JPEG_SOI, 0)?;
    let eoi = find_marker(buf, JPEG_EOI, start + JPEG_SOI.len())?;
    Some((start, eoi + JPEG_EOI.len()))
}

fn find_marker(buf: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
