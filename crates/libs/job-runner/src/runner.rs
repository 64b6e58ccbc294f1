//! The per-job frame loop
//!
//! Each job runs as its own tokio task: open the source, pull paced
//! frames, score each through the detector, publish progress, and settle
//! into exactly one terminal state. Cancellation and the stream time
//! budget share a single check point per frame iteration, so cancel
//! latency is bounded by one frame interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use headcount_core::{Detector, FrameSource};

use crate::events::JobEvent;
use crate::history::{HistoryEntry, HistoryStore};
use crate::job::{Job, JobKind, JobOutcome};
use crate::metrics::global_metrics;
use crate::recorder::OutputRecorder;

/// Everything a job loop needs besides its source
pub struct RunnerContext {
    /// The external counting primitive, shared across jobs
    pub detector: Arc<dyn Detector>,

    /// Where the terminal history entry goes
    pub history: Arc<HistoryStore>,

    /// Optional annotated-output encoder (uploaded videos)
    pub recorder: Option<OutputRecorder>,

    /// Public reference for the recorded output, carried in the `done`
    /// event when recording succeeds
    pub output_url: Option<String>,
}

/// Spawn the frame loop for `job`
///
/// `open` produces the frame source inside the loop task, so that open
/// failures follow the normal running → error path with zero frames
/// processed.
pub fn spawn_job<F>(job: Arc<Job>, open: F, ctx: RunnerContext) -> JoinHandle<()>
where
    F: Future<Output = headcount_core::Result<Box<dyn FrameSource>>> + Send + 'static,
{
    tokio::spawn(run(job, open, ctx))
}

async fn run<F>(job: Arc<Job>, open: F, mut ctx: RunnerContext)
where
    F: Future<Output = headcount_core::Result<Box<dyn FrameSource>>> + Send,
{
    if let Err(e) = job.mark_running().await {
        tracing::warn!(job_id = %job.id, "Refusing to start loop: {}", e);
        return;
    }

    let mut recorder = ctx.recorder.take();

    let mut source = match open.await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(job_id = %job.id, "Source open failed: {}", e);
            settle(&job, recorder, &ctx, JobOutcome::Failed(e.to_string())).await;
            return;
        }
    };

    let mut cancel_rx = job.cancel_receiver();
    let deadline = (job.config.max_seconds > 0)
        .then(|| Instant::now() + Duration::from_secs(job.config.max_seconds));

    let outcome = loop {
        // The single per-iteration check point: cancellation and the
        // time budget are both observed here, at a frame boundary.
        if *cancel_rx.borrow_and_update() {
            break JobOutcome::Cancelled;
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                break JobOutcome::Completed;
            }
        }

        let pulled = match deadline {
            Some(d) => tokio::select! {
                _ = cancel_rx.changed() => continue,
                _ = tokio::time::sleep_until(d) => continue,
                result = source.next_frame() => result,
            },
            None => tokio::select! {
                _ = cancel_rx.changed() => continue,
                result = source.next_frame() => result,
            },
        };

        let frame = match pulled {
            Ok(Some(frame)) => frame,
            Ok(None) => break JobOutcome::Completed,
            Err(e) => {
                tracing::error!(job_id = %job.id, "Source read failed: {}", e);
                break JobOutcome::Failed(e.to_string());
            }
        };

        // The loop waits for the detector; other jobs proceed on their
        // own tasks.
        let detection = match ctx.detector.detect(&frame.jpeg, job.config.conf).await {
            Ok(detection) => detection,
            Err(e) => {
                tracing::error!(job_id = %job.id, "Detection failed: {}", e);
                break JobOutcome::Failed(e.to_string());
            }
        };

        let (count, max_count) = job.observe_frame(detection.count).await;
        global_metrics().frame_processed();
        job.events.publish(JobEvent::Frame { count, max_count });

        let preview = detection.annotated_jpeg.unwrap_or_else(|| frame.jpeg.clone());
        job.preview.publish(preview.clone());

        if let Some(rec) = recorder.as_mut() {
            if let Err(e) = rec.write_frame(&preview).await {
                tracing::warn!(job_id = %job.id, "Output recording stopped: {}", e);
                if let Some(rec) = recorder.take() {
                    rec.abort().await;
                }
            }
        }
    };

    // Release the decoder before anything terminal becomes observable.
    source.close().await;

    settle(&job, recorder, &ctx, outcome).await;
}

/// Terminal sequence: finalize output, publish the terminal event, write
/// the history entry, close the preview, transition state.
async fn settle(
    job: &Arc<Job>,
    recorder: Option<OutputRecorder>,
    ctx: &RunnerContext,
    outcome: JobOutcome,
) {
    let video_url = match recorder {
        Some(rec) if matches!(outcome, JobOutcome::Completed) => match rec.finish().await {
            Some(path) => {
                job.set_output_path(path).await;
                ctx.output_url.clone()
            }
            None => None,
        },
        Some(rec) => {
            rec.abort().await;
            None
        }
        None => None,
    };

    let snapshot = job.snapshot().await;

    let event = match &outcome {
        JobOutcome::Completed | JobOutcome::Cancelled => JobEvent::Done {
            max_count: snapshot.max_count,
            video_url,
        },
        JobOutcome::Failed(message) => JobEvent::Error {
            message: message.clone(),
        },
    };
    job.events.publish(event);

    let elapsed = snapshot.elapsed_seconds();
    let duration_seconds = match job.kind {
        JobKind::Image => None,
        JobKind::Video => match &outcome {
            JobOutcome::Completed => snapshot.media_duration.or(elapsed),
            _ => elapsed,
        },
        JobKind::Stream => elapsed,
    };
    let count = if snapshot.frames == 0 && matches!(outcome, JobOutcome::Failed(_)) {
        None
    } else {
        Some(snapshot.max_count)
    };

    ctx.history
        .append(HistoryEntry {
            kind: job.kind,
            filename: job.source.clone(),
            duration_seconds,
            count,
            timestamp: Utc::now(),
        })
        .await;

    job.preview.close();
    job.finish(&outcome).await;
    global_metrics().job_finished();

    let final_state = job.state().await;
    tracing::info!(
        job_id = %job.id,
        state = %final_state,
        frames = snapshot.frames,
        max_count = snapshot.max_count,
        "Job finished"
    );
}
