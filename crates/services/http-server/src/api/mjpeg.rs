//! MJPEG preview streams
//!
//! Serves the latest annotated frame of a running job as a
//! `multipart/x-mixed-replace` stream. Attaching mid-job is valid and
//! yields only frames produced after attachment; the stream ends when
//! the job reaches a terminal state.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;

use super::{AppState, ErrorResponse};

const BOUNDARY: &str = "frame";

/// GET /api/job/:job_id/mjpeg
pub async fn job_mjpeg(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let Some(job) = state.manager.get(&job_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "job_not_found",
                format!("Job {} not found", job_id),
            )),
        )
            .into_response();
    };

    // Subscribing can race the close sentinel; the guard poll below
    // covers a sentinel that lands between subscribe and the first read.
    let mut viewer = job.preview.subscribe();
    let terminal = job.is_terminal().await;

    let stream = async_stream::stream! {
        if !terminal {
            loop {
                tokio::select! {
                    frame = viewer.next() => match frame {
                        Some(frame) => {
                            let mut part = Vec::with_capacity(frame.jpeg.len() + 128);
                            part.extend_from_slice(
                                format!(
                                    "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                                    BOUNDARY,
                                    frame.jpeg.len()
                                )
                                .as_bytes(),
                            );
                            part.extend_from_slice(&frame.jpeg);
                            part.extend_from_slice(b"\r\n");
                            yield Ok::<_, Infallible>(Bytes::from(part));
                        }
                        None => break,
                    },
                    // Guard poll: the close sentinel may predate this
                    // viewer's attachment.
                    _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {
                        if job.is_terminal().await {
                            break;
                        }
                    }
                }
            }
        }
        // Closing boundary so well-behaved clients stop cleanly.
        yield Ok(Bytes::from(format!("--{}--\r\n", BOUNDARY)));
    };

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
        )],
        Body::from_stream(stream),
    )
        .into_response()
}
