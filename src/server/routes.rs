//! Request handlers

use super::{error::error_response, AppState};
use crate::{error::BgRemovalError, services::ImageIOService};
use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use instant::Instant;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Body of `GET /ping`
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub message: &'static str,
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        message: "Background Remover API is running",
    })
}

/// File part of a multipart upload
struct Upload {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Bytes,
}

/// Pick the upload from a multipart body
///
/// The field named `file` wins. Without one, the first field carrying a file
/// name or content type is used.
async fn upload_field(
    multipart: &mut Multipart,
) -> std::result::Result<Option<Upload>, MultipartError> {
    let mut fallback = None;
    while let Some(field) = multipart.next_field().await? {
        let is_file = field.name() == Some("file");
        if !is_file && (fallback.is_some() || !carries_file(&field)) {
            continue;
        }
        let upload = Upload {
            filename: field.file_name().map(str::to_string),
            content_type: field.content_type().map(str::to_string),
            bytes: field.bytes().await?,
        };
        if is_file {
            return Ok(Some(upload));
        }
        fallback = Some(upload);
    }
    Ok(fallback)
}

fn carries_file(field: &Field<'_>) -> bool {
    field.file_name().is_some() || field.content_type().is_some()
}

fn validate_content_type(content_type: Option<&str>) -> crate::Result<()> {
    match content_type {
        Some(ct) if ct.to_ascii_lowercase().starts_with("image/") => Ok(()),
        Some(ct) => Err(BgRemovalError::validation(format!(
            "File must be an image, got content type '{ct}'"
        ))),
        None => Err(BgRemovalError::validation(
            "File must be an image, no content type given",
        )),
    }
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };

    let upload = match upload_field(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return BgRemovalError::validation("No file uploaded, expected a 'file' field")
                .into_response()
        },
        Err(e) => return error_response(e.status(), e.body_text()),
    };

    if let Err(e) = validate_content_type(upload.content_type.as_deref()) {
        return e.into_response();
    }

    debug!(
        filename = upload.filename.as_deref().unwrap_or_default(),
        content_type = upload.content_type.as_deref().unwrap_or_default(),
        bytes = upload.bytes.len(),
        "Upload received"
    );

    let start = Instant::now();
    let pipeline = Arc::clone(&state.pipeline);
    let bytes = upload.bytes;
    let processed = tokio::task::spawn_blocking(move || pipeline.process_bytes(&bytes)).await;

    let png = match processed {
        Ok(Ok(png)) => png,
        Ok(Err(e)) => return e.into_response(),
        Err(e) => {
            return BgRemovalError::internal(format!("Processing task failed: {e}"))
                .into_response()
        },
    };

    let filename = ImageIOService::output_filename(upload.filename.as_deref());
    info!(
        filename = %filename,
        output_bytes = png.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Background removed"
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        png,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content_type() {
        assert!(validate_content_type(Some("image/png")).is_ok());
        assert!(validate_content_type(Some("IMAGE/JPEG")).is_ok());

        let err = validate_content_type(Some("text/plain")).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.detail().contains("image"));

        let err = validate_content_type(None).unwrap_err();
        assert!(err.detail().contains("image"));
    }
}
