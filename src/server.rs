use crate::config::HttpConfig;
use crate::error::AppError;
use crate::event::{decode_object_ref, ObjectRef};
use crate::locator::{MomentAnalyzer, MomentOutcome};
use crate::storage::ObjectStore;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Message returned when no matching moment exists in the video
const NOT_DETECTED_MESSAGE: &str = "No kid saying '67' found in video";

/// Shared dependencies for the webhook handlers.
///
/// Dependencies are explicit so tests can substitute fakes; nothing is
/// reached through process-wide state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    /// Absent when no API key is configured; requests then fail with a
    /// configuration error before any download is attempted
    pub analyzer: Option<Arc<dyn MomentAnalyzer>>,
    pub output_bucket: Option<String>,
}

/// Body of a completed analysis response
#[derive(Debug, Serialize, PartialEq)]
pub struct EventResponse {
    pub status: &'static str,
    pub kid_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_saved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl EventResponse {
    fn detected(second: f64, frame_name: Option<String>) -> Self {
        Self {
            status: "ok",
            kid_detected: true,
            timestamp_seconds: Some(second),
            frame_saved: Some(frame_name.is_some()),
            frame_name,
            message: None,
        }
    }

    fn not_detected() -> Self {
        Self {
            status: "ok",
            kid_detected: false,
            timestamp_seconds: None,
            frame_saved: None,
            frame_name: None,
            message: Some(NOT_DETECTED_MESSAGE),
        }
    }
}

/// Create the webhook router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_event))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Entry point for storage object-creation notifications
#[instrument(skip(state, payload))]
async fn handle_event(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    metrics::counter!("capture.requests.received").increment(1);

    match process_event(&state, &payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            error!(error = %e, "event processing failed");
            metrics::counter!("capture.requests.failed").increment(1);
            e.into_response()
        }
    }
}

/// Run one event through the pipeline: decode, download, analyze, publish.
///
/// The downloaded video lives in scratch storage owned by this function;
/// every branch below drops it before returning.
async fn process_event(state: &AppState, payload: &Value) -> Result<EventResponse, AppError> {
    let object_ref = decode_object_ref(payload).ok_or(AppError::MissingObjectRef)?;

    let analyzer = state.analyzer.as_ref().ok_or(AppError::AnalyzerNotConfigured)?;

    info!(bucket = %object_ref.bucket, name = %object_ref.name, "processing video");

    let video = state
        .store
        .download_object(&object_ref.bucket, &object_ref.name)
        .await
        .map_err(AppError::Download)?;

    match analyzer.locate_moment(video.path()).await {
        MomentOutcome::Detected { second, frame_png } => {
            metrics::counter!("capture.detections.positive").increment(1);
            let frame_name = publish_frame(state, &object_ref, second, frame_png).await?;
            Ok(EventResponse::detected(second, frame_name))
        }
        MomentOutcome::NotDetected => {
            metrics::counter!("capture.detections.negative").increment(1);
            info!("no matching moment in video");
            Ok(EventResponse::not_detected())
        }
    }
}

/// Upload the captured frame when an output bucket is configured.
///
/// Returns the object name the frame was stored under, if any.
async fn publish_frame(
    state: &AppState,
    object_ref: &ObjectRef,
    second: f64,
    frame_png: Vec<u8>,
) -> Result<Option<String>, AppError> {
    let Some(output_bucket) = state.output_bucket.as_deref() else {
        return Ok(None);
    };

    let frame_name = frame_object_name(&object_ref.name, second);

    state
        .store
        .upload_object(output_bucket, &frame_name, frame_png, "image/png")
        .await
        .map_err(AppError::Upload)?;

    info!(bucket = %output_bucket, frame = %frame_name, "captured frame uploaded");
    metrics::counter!("capture.frames.uploaded").increment(1);

    Ok(Some(frame_name))
}

/// Object name for a captured frame: source basename plus the detected second
pub fn frame_object_name(source_name: &str, second: f64) -> String {
    let stem = match source_name.rsplit_once('.') {
        // Only strip an extension, not a dot inside a directory component
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => source_name,
    };

    format!("{stem}-kid-67-frame-{second:.1}s.png")
}

/// Start the webhook server
pub async fn start_server(state: AppState, config: &HttpConfig) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "starting webhook server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("webhook server error")?;

    Ok(())
}
