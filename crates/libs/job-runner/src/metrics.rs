//! Engine metrics
//!
//! Basic counters for monitoring the job engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine metrics collector
#[derive(Default)]
pub struct Metrics {
    /// Total jobs created since startup
    jobs_created: AtomicU64,

    /// Total jobs that reached a terminal state
    jobs_finished: AtomicU64,

    /// Total jobs evicted from the registry
    jobs_evicted: AtomicU64,

    /// Total frames scored across all jobs
    frames_processed: AtomicU64,

    /// Total events published across all jobs
    events_published: AtomicU64,

    /// Total synchronous image detections
    images_processed: AtomicU64,

    /// Startup timestamp (unix seconds)
    startup_time: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            startup_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_evicted(&self) {
        self.jobs_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn image_processed(&self) {
        self.images_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let uptime_secs = now.saturating_sub(self.startup_time.load(Ordering::Relaxed));

        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_finished: self.jobs_finished.load(Ordering::Relaxed),
            jobs_evicted: self.jobs_evicted.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            images_processed: self.images_processed.load(Ordering::Relaxed),
            uptime_secs,
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_finished: u64,
    pub jobs_evicted: u64,
    pub frames_processed: u64,
    pub events_published: u64,
    pub images_processed: u64,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Average frames scored per second of uptime
    pub fn frames_per_second(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            self.frames_processed as f64 / self.uptime_secs as f64
        }
    }
}

/// Global metrics instance
static GLOBAL_METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(Metrics::new()))
        .clone()
}
