//! Process-wide job registry
//!
//! The manager is the single ownership point for job lookup: handlers and
//! loops never mutate the registry directly. Terminal jobs are evicted
//! after a retention window to bound memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::job::{Job, JobConfig, JobError, JobKind};
use crate::metrics::global_metrics;

/// Registry limits and housekeeping knobs
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Upper bound on registered jobs (running or awaiting eviction)
    pub max_jobs: usize,

    /// How long terminal jobs stay queryable before eviction
    pub retention: Duration,

    /// Highest accepted target frame rate
    pub max_fps: f32,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_jobs: 32,
            retention: Duration::from_secs(300),
            max_fps: 30.0,
        }
    }
}

/// Registry of all live jobs
pub struct JobManager {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    config: JobManagerConfig,
}

impl JobManager {
    pub fn new(config: JobManagerConfig) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Validate parameters and register a new pending job
    pub async fn create(
        &self,
        kind: JobKind,
        source: &str,
        config: JobConfig,
    ) -> Result<Arc<Job>, JobError> {
        if source.trim().is_empty() {
            return Err(JobError::InvalidConfig(
                "source descriptor must not be empty".to_string(),
            ));
        }
        if config.fps <= 0.0 || config.fps > self.config.max_fps {
            return Err(JobError::InvalidConfig(format!(
                "target fps must be in (0, {}], got {}",
                self.config.max_fps, config.fps
            )));
        }
        if !(0.0..=1.0).contains(&config.conf) {
            return Err(JobError::InvalidConfig(format!(
                "confidence must be in [0, 1], got {}",
                config.conf
            )));
        }

        let mut jobs = self.jobs.write().await;
        if jobs.len() >= self.config.max_jobs {
            return Err(JobError::MaxJobsReached);
        }

        let job_id = format!(
            "job_{}",
            &uuid::Uuid::new_v4().simple().to_string()[..12]
        );
        let job = Arc::new(Job::new(job_id.clone(), kind, source.to_string(), config));
        jobs.insert(job_id.clone(), job.clone());

        global_metrics().job_created();
        tracing::info!(job_id = %job_id, kind = %kind, source = %source, "Job created");

        Ok(job)
    }

    /// Look up a job by id
    pub async fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Request cancellation; no-op when the job is already terminal
    pub async fn cancel(&self, id: &str) -> Result<(), JobError> {
        let job = self.get(id).await.ok_or(JobError::NotFound)?;
        job.cancel().await;
        Ok(())
    }

    /// Number of registered jobs
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Remove terminal jobs whose retention window has elapsed
    pub async fn evict_finished(&self) {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let now = Utc::now();

        let mut to_remove = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for (id, job) in jobs.iter() {
                let snapshot = job.snapshot().await;
                if !snapshot.state.is_terminal() {
                    continue;
                }
                let ended = snapshot.ended_at.unwrap_or(job.created_at);
                if now - ended >= retention {
                    to_remove.push(id.clone());
                }
            }
        }

        if !to_remove.is_empty() {
            let mut jobs = self.jobs.write().await;
            for id in to_remove {
                // Dropping the Arc releases the job's fan-out endpoints
                // once the last consumer handle goes away.
                jobs.remove(&id);
                global_metrics().job_evicted();
                tracing::debug!(job_id = %id, "Evicted finished job");
            }
        }
    }

    /// Run periodic eviction until shutdown
    ///
    /// Spawn as a background task alongside the server.
    pub async fn run_eviction_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = interval.as_secs(), "Job eviction task started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.evict_finished().await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job eviction task shutting down");
                    break;
                }
            }
        }
    }
}
