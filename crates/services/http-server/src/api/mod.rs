//! API surface
//!
//! Router and shared handler state. The handlers are thin: validation,
//! then a call into the job engine, then a serialized response.

pub mod jobs;
pub mod mjpeg;
pub mod process;
pub mod ws;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use headcount_core::Detector;
use headcount_job_runner::{HistoryStore, JobManager};

use crate::config::Config;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub history: Arc<HistoryStore>,
    pub detector: Arc<dyn Detector>,
    pub config: Arc<Config>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes as usize;

    Router::new()
        .route("/health", get(jobs::health))
        .route("/api/process/image", post(process::process_image))
        .route("/api/process/video", post(process::process_video))
        .route("/api/process/stream", post(process::process_stream))
        .route(
            "/api/job/:job_id",
            get(jobs::get_job).delete(jobs::cancel_job),
        )
        .route("/api/job/:job_id/mjpeg", get(mjpeg::job_mjpeg))
        .route("/api/job/:job_id/video", get(jobs::get_job_video))
        .route("/api/history", get(jobs::get_history))
        .route("/api/metrics", get(jobs::get_metrics))
        .route("/ws/job/:job_id", get(ws::job_events))
        // Uploads carry whole videos; the multipart framing adds a little
        // on top of the payload cap enforced while spooling.
        .layer(DefaultBodyLimit::max(upload_limit + 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
