use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced by the webhook request pipeline
#[derive(Debug, Error)]
pub enum AppError {
    /// Event payload did not yield a usable (bucket, name) pair
    #[error("missing bucket or name")]
    MissingObjectRef,

    /// Video analysis is disabled because no API key was configured
    #[error("GEMINI_API_KEY not configured")]
    AnalyzerNotConfigured,

    /// Source video could not be fetched from object storage
    #[error("failed to download video: {0:#}")]
    Download(anyhow::Error),

    /// Captured frame could not be published to the output bucket
    #[error("failed to upload frame: {0:#}")]
    Upload(anyhow::Error),
}

impl AppError {
    /// Returns true if this error should be reported as a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::MissingObjectRef)
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (self.status_code(), body).into_response()
    }
}
