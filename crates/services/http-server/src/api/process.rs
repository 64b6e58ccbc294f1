//! Request intake: still images, uploaded videos, live streams
//!
//! Images are scored synchronously with no job. Videos and streams get
//! an isolated job whose loop runs on its own task, independent of this
//! handler returning.

use std::time::Instant;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use headcount_core::{probe, BoundingBox, FfmpegSource, FrameSource};
use headcount_job_runner::{
    global_metrics, spawn_job, HistoryEntry, JobConfig, JobError, JobKind, OutputRecorder,
    RunnerContext,
};

use super::{AppState, ErrorResponse};
use crate::upload::{read_field, spool_field, UploadError};

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub conf: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    pub fps: Option<f32>,
    pub max_seconds: Option<u64>,
}

/// Request body for stream jobs
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub url: String,

    #[serde(default)]
    pub fps: Option<f32>,

    #[serde(default)]
    pub max_seconds: Option<u64>,
}

/// Response for synchronous image processing
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub count: u32,
    pub boxes: Vec<BoundingBox>,
    pub time_ms: u64,
    pub image_b64: String,
}

/// Response for asynchronous job creation
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mjpeg_url: Option<String>,
}

fn job_error_response(err: JobError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        JobError::InvalidConfig(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_config", message)),
        ),
        JobError::MaxJobsReached => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "too_many_jobs",
                "maximum concurrent jobs reached",
            )),
        ),
        JobError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("job_not_found", "job not found")),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("internal", other.to_string())),
        ),
    }
}

fn upload_error_response(err: UploadError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        UploadError::TooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse::new("upload_too_large", err.to_string())),
        ),
        other => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("bad_upload", other.to_string())),
        ),
    }
}

/// Score one still image synchronously
///
/// POST /api/process/image?conf=<float>
pub async fn process_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let conf = query.conf.unwrap_or(state.config.detector.default_conf);
    if !(0.0..=1.0).contains(&conf) {
        return job_error_response(JobError::InvalidConfig(format!(
            "confidence must be in [0, 1], got {}",
            conf
        )))
        .into_response();
    }

    let mut image: Option<(String, Vec<u8>)> = None;
    while let Ok(Some(mut field)) = multipart.next_field().await {
        if field.name() == Some("image") || field.file_name().is_some() {
            let filename = field.file_name().unwrap_or("image").to_string();
            match read_field(&mut field, state.config.server.max_upload_bytes).await {
                Ok(data) => {
                    image = Some((filename, data));
                    break;
                }
                Err(e) => return upload_error_response(e).into_response(),
            }
        }
    }

    let Some((filename, data)) = image else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("bad_upload", "missing image field")),
        )
            .into_response();
    };
    if data.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("bad_upload", "empty image payload")),
        )
            .into_response();
    }

    let started = Instant::now();
    let detection = match state.detector.detect(&data, conf).await {
        Ok(detection) => detection,
        Err(e) => {
            tracing::error!(filename = %filename, "Image detection failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new("detection_failed", e.to_string())),
            )
                .into_response();
        }
    };
    let time_ms = started.elapsed().as_millis() as u64;

    global_metrics().image_processed();
    state
        .history
        .append(HistoryEntry {
            kind: JobKind::Image,
            filename,
            duration_seconds: None,
            count: Some(detection.count),
            timestamp: chrono::Utc::now(),
        })
        .await;

    let annotated = detection
        .annotated_jpeg
        .map(|jpeg| jpeg.to_vec())
        .unwrap_or(data);

    (
        StatusCode::OK,
        Json(ImageResponse {
            count: detection.count,
            boxes: detection.boxes,
            time_ms,
            image_b64: base64::engine::general_purpose::STANDARD.encode(annotated),
        }),
    )
        .into_response()
}

/// Create a job for an uploaded video
///
/// POST /api/process/video?fps=<float>&max_seconds=<int>
pub async fn process_video(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let fps = query.fps.unwrap_or(state.config.jobs.default_fps);
    let max_seconds = query.max_seconds.unwrap_or(0);

    let mut upload: Option<(String, TempPath)> = None;
    while let Ok(Some(mut field)) = multipart.next_field().await {
        if field.name() == Some("video") || field.file_name().is_some() {
            let filename = field.file_name().unwrap_or("video").to_string();
            match spool_field(&mut field, state.config.server.max_upload_bytes).await {
                Ok((temp, bytes)) => {
                    tracing::debug!(filename = %filename, bytes, "Video upload spooled");
                    upload = Some((filename, temp));
                    break;
                }
                Err(e) => return upload_error_response(e).into_response(),
            }
        }
    }

    let Some((filename, temp)) = upload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("bad_upload", "missing video field")),
        )
            .into_response();
    };

    let config = JobConfig {
        fps,
        max_seconds,
        conf: state.config.detector.default_conf,
    };
    let job = match state.manager.create(JobKind::Video, &filename, config).await {
        Ok(job) => job,
        Err(e) => return job_error_response(e).into_response(),
    };

    job.set_media_duration(probe::media_duration(&temp).await).await;

    let (recorder, output_url) = if state.config.jobs.record_outputs {
        let output_path = state.config.jobs.output_dir.join(format!("{}.mp4", job.id));
        match OutputRecorder::create(&output_path, fps).await {
            Ok(recorder) => (
                Some(recorder),
                Some(format!("/api/job/{}/video", job.id)),
            ),
            Err(e) => {
                tracing::warn!(job_id = %job.id, "Output recording unavailable: {}", e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let path = temp.to_path_buf();
    let open = async move {
        FfmpegSource::open_file(&path.to_string_lossy(), fps)
            .await
            .map(|source| Box::new(source) as Box<dyn FrameSource>)
    };

    let handle = spawn_job(
        job.clone(),
        open,
        RunnerContext {
            detector: state.detector.clone(),
            history: state.history.clone(),
            recorder,
            output_url,
        },
    );

    // The temp file lives until the loop is done with it.
    tokio::spawn(async move {
        let _keep = temp;
        let _ = handle.await;
    });

    (
        StatusCode::OK,
        Json(CreateJobResponse {
            job_id: job.id.clone(),
            mjpeg_url: None,
        }),
    )
        .into_response()
}

/// Create a job for a live stream URL
///
/// POST /api/process/stream with `{url, fps, max_seconds}`
pub async fn process_stream(
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> impl IntoResponse {
    if url::Url::parse(&request.url).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "invalid_url",
                format!("not an absolute URL: {}", request.url),
            )),
        )
            .into_response();
    }

    let fps = request.fps.unwrap_or(state.config.jobs.default_fps);
    let config = JobConfig {
        fps,
        max_seconds: request.max_seconds.unwrap_or(0),
        conf: state.config.detector.default_conf,
    };

    let job = match state
        .manager
        .create(JobKind::Stream, &request.url, config)
        .await
    {
        Ok(job) => job,
        Err(e) => return job_error_response(e).into_response(),
    };

    let stream_url = request.url.clone();
    let open = async move {
        FfmpegSource::open_stream(&stream_url, fps)
            .await
            .map(|source| Box::new(source) as Box<dyn FrameSource>)
    };

    spawn_job(
        job.clone(),
        open,
        RunnerContext {
            detector: state.detector.clone(),
            history: state.history.clone(),
            recorder: None,
            output_url: None,
        },
    );

    (
        StatusCode::OK,
        Json(CreateJobResponse {
            job_id: job.id.clone(),
            mjpeg_url: Some(format!("/api/job/{}/mjpeg", job.id)),
        }),
    )
        .into_response()
}
