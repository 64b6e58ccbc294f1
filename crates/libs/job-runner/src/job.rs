//! Job state and lifecycle
//!
//! A job occupies exactly one of pending/running/done/error/cancelled at
//! any instant and only ever moves forward. Counters and state live
//! behind one lock so readers always observe a consistent
//! (count, state) pair.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use crate::events::EventBroadcaster;
use crate::preview::PreviewMultiplexer;

/// What kind of input a job processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Video,
    Stream,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Image => write!(f, "image"),
            JobKind::Video => write!(f, "video"),
            JobKind::Stream => write!(f, "stream"),
        }
    }
}

/// Lifecycle state; transitions are monotonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobState {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Done => write!(f, "done"),
            JobState::Error => write!(f, "error"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-job processing parameters, validated at creation
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Target frame rate
    pub fps: f32,

    /// Wall-clock time budget in seconds; 0 means unbounded
    pub max_seconds: u64,

    /// Detection confidence threshold
    pub conf: f32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            fps: 5.0,
            max_seconds: 0,
            conf: 0.25,
        }
    }
}

/// How a job reached its terminal state
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Source exhausted or time budget elapsed
    Completed,

    /// Unrecoverable source or detector failure
    Failed(String),

    /// External cancellation observed at a frame boundary
    Cancelled,
}

/// Job-related errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Maximum concurrent jobs reached")]
    MaxJobsReached,

    #[error("Job not found")]
    NotFound,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobState, to: JobState },
}

/// Mutable part of a job, guarded as one unit
#[derive(Debug)]
struct JobInner {
    state: JobState,
    current_count: u32,
    max_count: u32,
    frames: u64,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    media_duration: Option<f64>,
    output_path: Option<PathBuf>,
}

/// Consistent point-in-time view of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub state: JobState,
    pub current_count: u32,
    pub max_count: u32,
    pub frames: u64,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub media_duration: Option<f64>,
    pub output_path: Option<PathBuf>,
}

impl JobSnapshot {
    /// Wall-clock seconds between start and end (or now, while running)
    pub fn elapsed_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.ended_at.unwrap_or_else(Utc::now);
        let secs = (end - started).num_milliseconds() as f64 / 1000.0;
        Some((secs * 100.0).round() / 100.0)
    }
}

/// One counting task with its own lifecycle, counters and fan-out
/// endpoints
#[derive(Debug)]
pub struct Job {
    /// Unique job id (`job_` + 12 hex chars)
    pub id: String,

    pub kind: JobKind,

    /// Filename or URL being processed
    pub source: String,

    pub config: JobConfig,

    pub created_at: DateTime<Utc>,

    inner: RwLock<JobInner>,

    /// Cooperative cancellation signal, checked once per frame iteration
    cancel_tx: watch::Sender<bool>,

    /// Progress/terminal event fan-out
    pub events: EventBroadcaster,

    /// Latest annotated frame fan-out
    pub preview: PreviewMultiplexer,
}

impl Job {
    pub fn new(id: String, kind: JobKind, source: String, config: JobConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id,
            kind,
            source,
            config,
            created_at: Utc::now(),
            inner: RwLock::new(JobInner {
                state: JobState::Pending,
                current_count: 0,
                max_count: 0,
                frames: 0,
                error: None,
                started_at: None,
                ended_at: None,
                media_duration: None,
                output_path: None,
            }),
            cancel_tx,
            events: EventBroadcaster::new(),
            preview: PreviewMultiplexer::new(),
        }
    }

    /// Consistent snapshot of counters and state
    pub async fn snapshot(&self) -> JobSnapshot {
        let inner = self.inner.read().await;
        JobSnapshot {
            state: inner.state,
            current_count: inner.current_count,
            max_count: inner.max_count,
            frames: inner.frames,
            error: inner.error.clone(),
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            media_duration: inner.media_duration,
            output_path: inner.output_path.clone(),
        }
    }

    pub async fn state(&self) -> JobState {
        self.inner.read().await.state
    }

    pub async fn is_terminal(&self) -> bool {
        self.inner.read().await.state.is_terminal()
    }

    /// Transition pending → running
    pub async fn mark_running(&self) -> Result<(), JobError> {
        let mut inner = self.inner.write().await;
        match inner.state {
            JobState::Pending => {
                inner.state = JobState::Running;
                inner.started_at = Some(Utc::now());
                Ok(())
            }
            from => Err(JobError::InvalidStateTransition {
                from,
                to: JobState::Running,
            }),
        }
    }

    /// Record one scored frame, returning the consistent
    /// (current, max) pair for the event being published
    pub async fn observe_frame(&self, count: u32) -> (u32, u32) {
        let mut inner = self.inner.write().await;
        inner.current_count = count;
        inner.max_count = inner.max_count.max(count);
        inner.frames += 1;
        (inner.current_count, inner.max_count)
    }

    /// Transition running → terminal; idempotent once terminal
    pub async fn finish(&self, outcome: &JobOutcome) {
        let mut inner = self.inner.write().await;
        if inner.state.is_terminal() {
            return;
        }
        inner.state = match outcome {
            JobOutcome::Completed => JobState::Done,
            JobOutcome::Failed(message) => {
                inner.error = Some(message.clone());
                JobState::Error
            }
            JobOutcome::Cancelled => JobState::Cancelled,
        };
        inner.ended_at = Some(Utc::now());
    }

    /// Request cooperative cancellation; no-op when already terminal
    pub async fn cancel(&self) {
        if self.is_terminal().await {
            return;
        }
        let _ = self.cancel_tx.send(true);
    }

    /// Receiver for the loop's per-frame cancellation check
    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Probed media duration for uploaded files, used in history
    pub async fn set_media_duration(&self, duration: Option<f64>) {
        self.inner.write().await.media_duration = duration;
    }

    /// Recorded annotated output, available once done
    pub async fn set_output_path(&self, path: PathBuf) {
        self.inner.write().await.output_path = Some(path);
    }
}
