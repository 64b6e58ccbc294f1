//! Job orchestration and real-time fan-out engine
//!
//! One counting job per request: an isolated, cancellable loop pulling
//! paced frames from a `FrameSource`, scoring each through the external
//! `Detector`, aggregating running/maximum counts, and fanning progress
//! out to any number of event subscribers and preview viewers. Jobs keep
//! running whether or not anyone is watching.

pub mod events;
pub mod history;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod preview;
pub mod recorder;
pub mod runner;

// Re-export main types
pub use events::{EventBroadcaster, EventSubscriber, JobEvent, SubscriberError};
pub use history::{HistoryEntry, HistoryStore};
pub use job::{Job, JobConfig, JobError, JobKind, JobOutcome, JobSnapshot, JobState};
pub use manager::{JobManager, JobManagerConfig};
pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
pub use preview::{PreviewFrame, PreviewMultiplexer, PreviewViewer};
pub use recorder::OutputRecorder;
pub use runner::{spawn_job, RunnerContext};
