use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, CaptureAnalysisResponse, CaptureRequest, WebcamCaptureRequest};
use crate::pipeline::source::{
    FrameGrabber, DEFAULT_CAMERA_HOST, DEFAULT_CAMERA_PORT, DEFAULT_WEBCAM_INDEX,
};

/// Filename prefix for frames grabbed from a phone camera.
pub const CAPTURE_PREFIX: &str = "droidcam";

/// Filename prefix for frames grabbed from a local webcam.
pub const WEBCAM_PREFIX: &str = "webcam";

/// `POST /capture/network`: grab one frame from a phone camera, save it and
/// analyze it.
pub async fn network(
    State(ctx): State<ApiContext>,
    body: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureAnalysisResponse>, ApiError> {
    let request = body_or_default(body)?;
    let host = request
        .ip_address
        .filter(|ip| !ip.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CAMERA_HOST.to_string());
    let port = request.port.unwrap_or(DEFAULT_CAMERA_PORT);

    tracing::info!(host = %host, port, "Network capture requested");

    let grabber = (ctx.grabbers)(&host, port, ctx.capture_timeout);
    capture_and_analyze(&ctx, grabber, CAPTURE_PREFIX).await
}

/// `POST /capture/webcam`: grab one frame from a local webcam, save it and
/// analyze it.
pub async fn webcam(
    State(ctx): State<ApiContext>,
    body: Result<Json<WebcamCaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureAnalysisResponse>, ApiError> {
    let request = body_or_default(body)?;
    let index = request.camera_index.unwrap_or(DEFAULT_WEBCAM_INDEX);

    tracing::info!(index, "Webcam capture requested");

    let grabber = (ctx.webcams)(index, ctx.capture_timeout);
    capture_and_analyze(&ctx, grabber, WEBCAM_PREFIX).await
}

/// A request without a JSON body uses defaults; a body that is not valid
/// for `T` is a 400.
fn body_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(request)) => Ok(request),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

async fn capture_and_analyze(
    ctx: &ApiContext,
    grabber: Box<dyn FrameGrabber>,
    prefix: &'static str,
) -> Result<Json<CaptureAnalysisResponse>, ApiError> {
    let analyzer = ctx.analyzer.clone();
    let captures_dir = ctx.captures_dir.clone();

    let response = tokio::task::spawn_blocking(move || {
        let path = grabber
            .capture_to(&captures_dir, prefix)
            .map_err(|e| ApiError::CaptureFailed(e.to_string()))?;
        let result = analyzer.analyze(&path);
        Ok::<_, ApiError>(CaptureAnalysisResponse {
            result,
            image_path: path.display().to_string(),
        })
    })
    .await??;

    Ok(Json(response))
}
