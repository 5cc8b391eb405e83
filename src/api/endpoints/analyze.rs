use std::io::Write;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{allowed_extension, ApiContext};
use crate::pipeline::analysis::{AnalysisResult, PlantAnalyzer};

/// `POST /analyze`: multipart upload in field `file`.
pub async fn upload(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResult>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| ApiError::BadRequest("No file part".into()))?;
    if filename.trim().is_empty() {
        return Err(ApiError::BadRequest("No selected file".into()));
    }
    let extension = allowed_extension(&filename)
        .ok_or_else(|| ApiError::UnsupportedMediaType("File type not allowed".into()))?;

    tracing::info!(filename = %filename, bytes = bytes.len(), "Upload received");

    let analyzer = ctx.analyzer.clone();
    let result =
        tokio::task::spawn_blocking(move || analyze_staged(&analyzer, &extension, &bytes)).await??;

    Ok(Json(result))
}

/// Stage the upload in a temp file and analyze it by path. The file is
/// removed when the handle drops.
fn analyze_staged(
    analyzer: &PlantAnalyzer,
    extension: &str,
    bytes: &[u8],
) -> Result<AnalysisResult, ApiError> {
    let mut staged = tempfile::Builder::new()
        .prefix("leafdoc-upload-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .map_err(|e| ApiError::Internal(format!("staging upload: {e}")))?;

    staged
        .write_all(bytes)
        .and_then(|_| staged.flush())
        .map_err(|e| ApiError::Internal(format!("staging upload: {e}")))?;

    Ok(analyzer.analyze(staged.path()))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the 16MB limit".into())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
