//! WebSocket event streams
//!
//! One socket per job subscription: a single `status` snapshot on
//! connect, then every event published after attachment, in publish
//! order. A socket that cannot keep up is closed rather than allowed to
//! stall the job.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;

use headcount_job_runner::{Job, JobEvent, JobState, SubscriberError};

use super::AppState;

/// GET /ws/job/:job_id
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.manager.get(&job_id).await {
        Some(job) => ws.on_upgrade(move |socket| stream_events(socket, job)),
        None => ws.on_upgrade(move |socket| reject_unknown(socket, job_id)),
    }
}

/// The original contract: unknown jobs still get a well-formed error
/// message over the socket before it closes.
async fn reject_unknown(mut socket: WebSocket, job_id: String) {
    let message = serde_json::json!({
        "type": "error",
        "message": format!("Job {} not found", job_id),
    });
    let _ = socket.send(Message::Text(message.to_string())).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn stream_events(mut socket: WebSocket, job: Arc<Job>) {
    // Subscribe before reading the snapshot so no event published in
    // between is missed.
    let mut subscriber = job.events.subscribe();
    let snapshot = job.snapshot().await;

    let status = serde_json::json!({
        "type": "status",
        "state": snapshot.state,
        "current_count": snapshot.current_count,
        "max_count": snapshot.max_count,
        "done": snapshot.state.is_terminal(),
    });
    if socket.send(Message::Text(status.to_string())).await.is_err() {
        return;
    }

    if snapshot.state.is_terminal() {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                // Client messages are ignored; a closed socket detaches us.
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => break,
            },
            // Guard poll: if the terminal event was published before this
            // socket subscribed, deliver it from the snapshot instead of
            // waiting forever.
            _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {
                if job.is_terminal().await {
                    let snapshot = job.snapshot().await;
                    let event = match snapshot.state {
                        JobState::Error => JobEvent::Error {
                            message: snapshot.error.unwrap_or_else(|| "job failed".to_string()),
                        },
                        _ => JobEvent::Done {
                            max_count: snapshot.max_count,
                            video_url: snapshot
                                .output_path
                                .is_some()
                                .then(|| format!("/api/job/{}/video", job.id)),
                        },
                    };
                    if let Ok(payload) = serde_json::to_string(&event) {
                        let _ = socket.send(Message::Text(payload)).await;
                    }
                    break;
                }
            },
            event = subscriber.next() => match event {
                Ok(Some(event)) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!(job_id = %job.id, "Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                    if event.is_terminal() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(SubscriberError::Overflow { missed }) => {
                    // Slow consumer policy: drop the connection, never
                    // the job.
                    tracing::warn!(job_id = %job.id, missed, "Closing lagging event subscriber");
                    break;
                }
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
