//! Job status, cancellation, history and service health

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use headcount_job_runner::{global_metrics, HistoryEntry, JobKind, JobState};

use super::{AppState, ErrorResponse};

/// Status snapshot of one job
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub state: JobState,
    pub kind: JobKind,
    pub source: String,
    pub current_count: u32,
    pub max_count: u32,
    pub frames: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

fn not_found(job_id: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "job_not_found",
            format!("Job {} not found", job_id),
        )),
    )
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/job/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let Some(job) = state.manager.get(&job_id).await else {
        return not_found(&job_id).into_response();
    };

    let snapshot = job.snapshot().await;
    let video_url = (snapshot.state == JobState::Done && snapshot.output_path.is_some())
        .then(|| format!("/api/job/{}/video", job.id));

    Json(JobStatusResponse {
        job_id: job.id.clone(),
        state: snapshot.state,
        kind: job.kind,
        source: job.source.clone(),
        current_count: snapshot.current_count,
        max_count: snapshot.max_count,
        frames: snapshot.frames,
        error: snapshot.error,
        video_url,
    })
    .into_response()
}

/// DELETE /api/job/:job_id — request cancellation
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.cancel(&job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found(&job_id).into_response(),
    }
}

/// GET /api/job/:job_id/video — recorded annotated output
pub async fn get_job_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let Some(job) = state.manager.get(&job_id).await else {
        return not_found(&job_id).into_response();
    };

    let snapshot = job.snapshot().await;
    let path = match (snapshot.state, snapshot.output_path) {
        (JobState::Done, Some(path)) => path,
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    "output_not_available",
                    "processed video not available",
                )),
            )
                .into_response();
        }
    };

    match tokio::fs::read(&path).await {
        Ok(data) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.mp4\"", job.id),
                ),
            ],
            Body::from(data),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(job_id = %job.id, "Failed to read output file: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("output_unreadable", e.to_string())),
            )
                .into_response()
        }
    }
}

/// GET /api/history — finished jobs, newest first
pub async fn get_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    let mut entries = state.history.list().await;
    entries.reverse();
    Json(entries)
}

/// GET /api/metrics — engine counters
pub async fn get_metrics() -> impl IntoResponse {
    Json(global_metrics().snapshot())
}
