//! Single-frame capture from a local webcam.
//!
//! Non-interactive: the device is opened, frames are read until the first
//! non-empty one arrives or the deadline passes, and that frame is returned
//! JPEG-encoded. Real devices need the `webcam` feature (OpenCV `videoio`).

use std::time::{Duration, Instant};

use super::capture::{FrameGrabber, DEFAULT_CAPTURE_TIMEOUT};
use super::SourceError;

/// Built-in camera on most machines.
pub const DEFAULT_WEBCAM_INDEX: i32 = 0;

/// Webcam attached to this machine, addressed by device index.
#[derive(Debug, Clone)]
pub struct LocalCamera {
    index: i32,
    timeout: Duration,
}

impl Default for LocalCamera {
    fn default() -> Self {
        Self::new(DEFAULT_WEBCAM_INDEX, DEFAULT_CAPTURE_TIMEOUT)
    }
}

impl LocalCamera {
    pub fn new(index: i32, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn describe(&self) -> String {
        format!("webcam #{}", self.index)
    }
}

impl FrameGrabber for LocalCamera {
    fn grab_frame(&self) -> Result<Vec<u8>, SourceError> {
        let _span = tracing::info_span!("webcam_capture", index = self.index).entered();
        let deadline = Instant::now() + self.timeout;
        device::grab(self.index, deadline)
    }
}

/// Pull frames from `next` until one is present or `deadline` passes.
///
/// `next` returns `Ok(None)` for an empty frame (cameras often emit a few
/// while warming up) and `Err` when the device stops delivering.
pub fn first_frame_within<F>(mut next: F, deadline: Instant) -> Result<Vec<u8>, SourceError>
where
    F: FnMut() -> Result<Option<Vec<u8>>, SourceError>,
{
    loop {
        if Instant::now() > deadline {
            return Err(SourceError::Capture("Timeout: no frame received".into()));
        }
        if let Some(frame) = next()? {
            return Ok(frame);
        }
    }
}

#[cfg(feature = "webcam")]
mod device {
    use std::time::Instant;

    use opencv::core::{Mat, Vector};
    use opencv::prelude::*;
    use opencv::{imgcodecs, videoio};

    use super::first_frame_within;
    use crate::pipeline::source::SourceError;

    fn cv_err(context: &str, e: opencv::Error) -> SourceError {
        SourceError::Capture(format!("{context}: {e}"))
    }

    pub(super) fn grab(index: i32, deadline: Instant) -> Result<Vec<u8>, SourceError> {
        let mut cap = videoio::VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| cv_err("Could not open webcam", e))?;
        let opened = cap
            .is_opened()
            .map_err(|e| cv_err("Could not open webcam", e))?;
        if !opened {
            return Err(SourceError::Capture(format!(
                "Could not access webcam #{index}. Make sure it is connected and not in use"
            )));
        }

        let mut frame = Mat::default();
        let jpeg = first_frame_within(
            || {
                let got = cap
                    .read(&mut frame)
                    .map_err(|e| cv_err("Failed to read webcam frame", e))?;
                if !got {
                    return Err(SourceError::Capture(
                        "Webcam stopped delivering frames".into(),
                    ));
                }
                if frame.empty() {
                    return Ok(None);
                }
                let mut buf = Vector::<u8>::new();
                imgcodecs::imencode(".jpg", &frame, &mut buf, &Vector::new())
                    .map_err(|e| cv_err("Failed to encode webcam frame", e))?;
                Ok(Some(buf.to_vec()))
            },
            deadline,
        );

        let _ = cap.release();
        jpeg
    }
}

#[cfg(not(feature = "webcam"))]
mod device {
    use std::time::Instant;

    use crate::pipeline::source::SourceError;

    pub(super) fn grab(index: i32, _deadline: Instant) -> Result<Vec<u8>, SourceError> {
        tracing::warn!(index, "Webcam requested but built without the `webcam` feature");
        Err(SourceError::Capture(
            "Webcam support is not enabled in this build (feature `webcam`)".into(),
        ))
    }
}
