//! HTTP mapping for [`BgRemovalError`]

use crate::error::BgRemovalError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

/// Error body, `{"detail": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Build a JSON error response
pub fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
        .into_response()
}

impl BgRemovalError {
    /// HTTP status for an error surfacing from a request
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Decode(_)
            | Self::Inference(_)
            | Self::Encode(_)
            | Self::Io(_)
            | Self::Image(_)
            | Self::InvalidConfig(_)
            | Self::Model(_)
            | Self::Network(_)
            | Self::Processing(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BgRemovalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_client_error() {
            warn!(error = %self, "Rejected request");
            error_response(status, self.detail())
        } else {
            error!(error = %self, "Request failed");
            error_response(status, format!("Error processing image: {}", self.detail()))
        }
    }
}
