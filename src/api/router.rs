//! HTTP router.
//!
//! Routes:
//! - `GET /health`
//! - `POST /analyze` (multipart, field `file`)
//! - `POST /capture/network` (JSON `{ip_address?, port?}`)
//! - `POST /capture/webcam` (JSON `{camera_index?}`)
//!
//! CORS is open to any origin; the browser front-end is served elsewhere.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::{ApiContext, MAX_UPLOAD_BYTES};

pub fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze", post(endpoints::analyze::upload))
        .route("/capture/network", post(endpoints::capture::network))
        .route("/capture/webcam", post(endpoints::capture::webcam))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use tower::ServiceExt;

    use crate::api::types::{GrabberFactory, WebcamFactory};
    use crate::pipeline::analysis::{PlantAnalyzer, StaticClassifierProvider};
    use crate::pipeline::source::{FrameGrabber, SourceError};
    use crate::pipeline::vision::MockVisionClient;

    const BOUNDARY: &str = "leafdocboundary";
    const HEALTHY_REPLY: &str =
        "health_status: healthy\ndisease_name: none\ntreatment: 1. Water regularly";

    /// Analyzers own blocking HTTP clients, so they are built and dropped
    /// outside the runtime; only the request itself runs inside it.
    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn png_bytes() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([40, 160, 60])))
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn test_ctx(replies: &[&str], captures_dir: &Path) -> ApiContext {
        let client = Arc::new(MockVisionClient::scripted(
            replies.iter().map(|r| Ok(r.to_string())).collect(),
        ));
        let analyzer = PlantAnalyzer::with_vision_client(
            client,
            Box::new(StaticClassifierProvider::unavailable()),
            Duration::from_secs(1),
        )
        .unwrap();
        ApiContext::new(Arc::new(analyzer), captures_dir.to_path_buf())
    }

    fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(ctx: ApiContext, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = build_router(ctx).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    struct FixedGrabber(Result<Vec<u8>, String>);

    impl FrameGrabber for FixedGrabber {
        fn grab_frame(&self) -> Result<Vec<u8>, SourceError> {
            self.0.clone().map_err(SourceError::Capture)
        }
    }

    fn grabbers(frame: Result<Vec<u8>, String>) -> GrabberFactory {
        Arc::new(move |_host: &str, _port: u16, _timeout: Duration| {
            Box::new(FixedGrabber(frame.clone())) as Box<dyn FrameGrabber>
        })
    }

    // -- Health ---------------------------------------------------------------

    #[test]
    fn health_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, json) = block_on(send(ctx.clone(), req));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn cors_allows_any_origin() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path());
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://example.org")
            .body(Body::empty())
            .unwrap();

        let resp = block_on(build_router(ctx.clone()).oneshot(req)).unwrap();
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    // -- Upload ---------------------------------------------------------------

    #[test]
    fn upload_png_returns_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&["wheat", HEALTHY_REPLY], dir.path());
        let req = multipart_request("file", "leaf.png", &png_bytes());

        let (status, json) = block_on(send(ctx.clone(), req));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["crop_name"], "wheat");
        assert_eq!(json["health_status"], "healthy");
        assert_eq!(json["disease_name"], "none");
        assert_eq!(json["treatment_recommendations"], "1. Water regularly");
    }

    #[test]
    fn upload_garbage_image_returns_fallback_record() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&["wheat"], dir.path());
        let req = multipart_request("file", "leaf.jpg", &[0u8; 256]);

        let (status, json) = block_on(send(ctx.clone(), req));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["health_status"], "unknown");
        assert_eq!(json["disease_name"], "analysis error");
    }

    #[test]
    fn upload_without_file_part_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path());
        let req = multipart_request("photo", "leaf.png", &png_bytes());

        let (status, json) = block_on(send(ctx.clone(), req));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "No file part");
    }

    #[test]
    fn upload_with_empty_filename_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path());
        let req = multipart_request("file", "", b"");

        let (status, json) = block_on(send(ctx.clone(), req));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "No selected file");
    }

    #[test]
    fn upload_with_bad_extension_is_415() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path());
        let req = multipart_request("file", "leaf.bmp", &png_bytes());

        let (status, json) = block_on(send(ctx.clone(), req));
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["error"]["code"], "UNSUPPORTED_MEDIA_TYPE");
        assert_eq!(json["error"]["message"], "File type not allowed");
    }

    // -- Network capture --------------------------------------------------------

    fn capture_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/capture/network")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn capture_saves_frame_and_analyzes_it() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&["orange", HEALTHY_REPLY], dir.path())
            .with_grabbers(grabbers(Ok(png_bytes())));

        let (status, json) = block_on(send(
            ctx.clone(),
            capture_request(r#"{"ip_address":"10.0.0.9","port":4747}"#),
        ));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["crop_name"], "orange");
        let saved = PathBuf::from(json["image_path"].as_str().unwrap());
        assert!(saved.starts_with(dir.path()));
        assert!(saved
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("droidcam_") && n.ends_with(".jpg")));
        assert!(saved.exists());
    }

    #[test]
    fn capture_failure_is_502() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path())
            .with_grabbers(grabbers(Err("Timeout: no frame received".into())));

        let (status, json) = block_on(send(ctx.clone(), capture_request("{}")));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "CAPTURE_FAILED");
    }

    #[test]
    fn capture_without_body_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_factory = seen.clone();
        let factory: GrabberFactory = Arc::new(move |host: &str, port: u16, _timeout: Duration| {
            *seen_in_factory.lock().unwrap() = Some((host.to_string(), port));
            Box::new(FixedGrabber(Err("offline".into()))) as Box<dyn FrameGrabber>
        });
        let ctx = test_ctx(&[], dir.path()).with_grabbers(factory);

        let req = Request::builder()
            .method("POST")
            .uri("/capture/network")
            .body(Body::empty())
            .unwrap();
        let (status, _) = block_on(send(ctx.clone(), req));

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(("192.168.1.2".to_string(), 4747))
        );
    }

    #[test]
    fn capture_with_malformed_body_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path()).with_grabbers(grabbers(Ok(png_bytes())));

        let (status, json) = block_on(send(ctx.clone(), capture_request(r#"{"port":"abc"}"#)));

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[test]
    fn capture_with_broken_json_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&[], dir.path()).with_grabbers(grabbers(Ok(png_bytes())));

        let (status, _) = block_on(send(ctx.clone(), capture_request("{not json")));

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // -- Webcam capture ---------------------------------------------------------

    fn webcams(frame: Result<Vec<u8>, String>, seen: Arc<std::sync::Mutex<Option<i32>>>) -> WebcamFactory {
        Arc::new(move |index: i32, _timeout: Duration| {
            *seen.lock().unwrap() = Some(index);
            Box::new(FixedGrabber(frame.clone())) as Box<dyn FrameGrabber>
        })
    }

    fn webcam_request(body: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method("POST").uri("/capture/webcam");
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[test]
    fn webcam_capture_saves_frame_and_analyzes_it() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let ctx = test_ctx(&["tomato", HEALTHY_REPLY], dir.path())
            .with_webcams(webcams(Ok(png_bytes()), seen.clone()));

        let (status, json) = block_on(send(ctx.clone(), webcam_request(Some(r#"{"camera_index":2}"#))));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["crop_name"], "tomato");
        assert_eq!(json["health_status"], "healthy");
        assert_eq!(*seen.lock().unwrap(), Some(2));
        let saved = PathBuf::from(json["image_path"].as_str().unwrap());
        assert!(saved.starts_with(dir.path()));
        assert!(saved
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("webcam_") && n.ends_with(".jpg")));
        assert!(saved.exists());
    }

    #[test]
    fn webcam_without_body_uses_first_camera() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let ctx = test_ctx(&[], dir.path())
            .with_webcams(webcams(Err("Could not access webcam #0".into()), seen.clone()));

        let (status, json) = block_on(send(ctx.clone(), webcam_request(None)));

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "CAPTURE_FAILED");
        assert_eq!(*seen.lock().unwrap(), Some(0));
    }
}
