//! Delayed job queue with key deduplication and due-time ordering

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    CancelOutcome, EnqueueOutcome, JobKey, JobState, QueueError, ScheduledJob,
};

/// Delayed job queue contract
///
/// A job key identifies at most one job at a time regardless of its state.
/// Adding a job under a key that is already held is a no-op reported as
/// [`EnqueueOutcome::AlreadyExists`], which is what makes scheduling
/// idempotent without any local bookkeeping in the scheduler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job unless its key is already held
    async fn enqueue(&self, job: ScheduledJob) -> Result<EnqueueOutcome, QueueError>;

    /// Find the job held under `key`, in any state
    async fn lookup(&self, key: &JobKey) -> Result<Option<ScheduledJob>, QueueError>;

    /// Remove the job held under `key`, in any state
    async fn cancel(&self, key: &JobKey) -> Result<CancelOutcome, QueueError>;

    /// All jobs in any of `states`
    async fn jobs(&self, states: &[JobState]) -> Result<Vec<ScheduledJob>, QueueError>;

    /// Move up to `limit` due jobs to `Active` and hand them out, earliest first.
    /// Each claimed job has `attempts_made` incremented.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, QueueError>;

    /// Mark an active job as processed successfully
    async fn complete(&self, key: &JobKey, job_id: Uuid) -> Result<(), QueueError>;

    /// Put an active job back to wait until `next_due`
    async fn retry(
        &self,
        key: &JobKey,
        job_id: Uuid,
        next_due: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError>;

    /// Mark an active job as permanently failed
    async fn fail(&self, key: &JobKey, job_id: Uuid, error: &str) -> Result<(), QueueError>;

    /// Counts per state
    async fn stats(&self) -> Result<JobQueueStats, QueueError>;
}

/// Statistics about the job queue state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobQueueStats {
    /// Jobs waiting for their due time or a retry
    pub delayed: usize,
    /// Jobs currently being processed
    pub active: usize,
    /// Retained completed jobs
    pub completed: usize,
    /// Retained failed jobs
    pub failed: usize,
}

impl JobQueueStats {
    pub fn total(&self) -> usize {
        self.delayed + self.active + self.completed + self.failed
    }
}

/// Retention behaviour for finished jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Drop a job as soon as it completes; its key becomes free again
    pub remove_on_complete: bool,
    /// Drop a job once it fails permanently; otherwise keep it as `Failed`
    pub remove_on_fail: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            remove_on_complete: crate::config::defaults::DEFAULT_REMOVE_ON_COMPLETE,
            remove_on_fail: crate::config::defaults::DEFAULT_REMOVE_ON_FAIL,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Every held job by key, in any state
    jobs: HashMap<JobKey, ScheduledJob>,
    /// Due-time index for delayed jobs (min-heap using Reverse).
    /// Holds one entry per delayed job; cancel drops the entry with the job.
    due: BinaryHeap<Reverse<(DateTime<Utc>, Uuid, JobKey)>>,
}

impl QueueState {
    fn index(&mut self, job: &ScheduledJob) {
        self.due
            .push(Reverse((job.due_at, job.id, job.key.clone())));
    }

    /// The active job under `key` if it is still the instance `job_id`
    fn active_mut(&mut self, key: &JobKey, job_id: Uuid) -> Option<&mut ScheduledJob> {
        self.jobs
            .get_mut(key)
            .filter(|job| job.id == job_id && job.state == JobState::Active)
    }
}

/// Process-local queue implementation
///
/// Jobs do not survive a restart; the startup reconciliation pass re-creates
/// them from the record store and the delivery ledger keeps re-created jobs
/// from sending twice.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    state: RwLock<QueueState>,
    options: QueueOptions,
}

impl InMemoryJobQueue {
    /// Create a new empty job queue
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: QueueOptions) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            options,
        }
    }

    /// Number of held jobs in any state
    pub async fn len(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ScheduledJob) -> Result<EnqueueOutcome, QueueError> {
        let mut state = self.state.write().await;

        if state.jobs.contains_key(&job.key) {
            debug!("Skipping duplicate job for key: {}", job.key);
            return Ok(EnqueueOutcome::AlreadyExists);
        }

        info!(
            "Enqueued job {} for person {} (due: {})",
            job.key,
            job.person_id(),
            job.due_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        state.index(&job);
        state.jobs.insert(job.key.clone(), job);
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn lookup(&self, key: &JobKey) -> Result<Option<ScheduledJob>, QueueError> {
        Ok(self.state.read().await.jobs.get(key).cloned())
    }

    async fn cancel(&self, key: &JobKey) -> Result<CancelOutcome, QueueError> {
        let mut state = self.state.write().await;

        match state.jobs.remove(key) {
            Some(job) => {
                state
                    .due
                    .retain(|Reverse((_, job_id, _))| *job_id != job.id);
                if job.state == JobState::Active {
                    warn!("Removed job {} while it was being processed", key);
                } else {
                    debug!("Removed {} job {}", job.state, key);
                }
                Ok(CancelOutcome::Removed)
            }
            None => Ok(CancelOutcome::NotFound),
        }
    }

    async fn jobs(&self, states: &[JobState]) -> Result<Vec<ScheduledJob>, QueueError> {
        let state = self.state.read().await;
        let mut jobs: Vec<ScheduledJob> = state
            .jobs
            .values()
            .filter(|job| states.contains(&job.state))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.key.cmp(&b.key)));
        Ok(jobs)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, QueueError> {
        let mut state = self.state.write().await;
        let mut claimed = Vec::new();

        while claimed.len() < limit {
            let Some(Reverse((due_at, _, _))) = state.due.peek() else {
                break;
            };
            if *due_at > now {
                break;
            }

            let Some(Reverse((due_at, job_id, key))) = state.due.pop() else {
                break;
            };

            // Skip index entries that no longer match a delayed job
            let Some(job) = state
                .jobs
                .get_mut(&key)
                .filter(|job| job.id == job_id && job.due_at == due_at && job.is_ready(now))
            else {
                continue;
            };

            job.state = JobState::Active;
            job.attempts_made += 1;
            claimed.push(job.clone());
        }

        if !claimed.is_empty() {
            debug!("Claimed {} due jobs from queue", claimed.len());
        }

        Ok(claimed)
    }

    async fn complete(&self, key: &JobKey, job_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.write().await;

        if state.active_mut(key, job_id).is_none() {
            debug!("Job {} was removed before it completed", key);
            return Ok(());
        }

        if self.options.remove_on_complete {
            state.jobs.remove(key);
            debug!("Job {} completed and removed from queue", key);
        } else if let Some(job) = state.active_mut(key, job_id) {
            job.state = JobState::Completed;
            job.last_error = None;
            debug!("Job {} completed", key);
        }

        Ok(())
    }

    async fn retry(
        &self,
        key: &JobKey,
        job_id: Uuid,
        next_due: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;

        let Some(job) = state.active_mut(key, job_id) else {
            debug!("Job {} was removed before its retry was recorded", key);
            return Ok(());
        };

        job.state = JobState::Delayed;
        job.due_at = next_due;
        job.last_error = Some(error.to_string());
        let job = job.clone();
        state.index(&job);

        Ok(())
    }

    async fn fail(&self, key: &JobKey, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut state = self.state.write().await;

        if state.active_mut(key, job_id).is_none() {
            debug!("Job {} was removed before it failed", key);
            return Ok(());
        }

        if self.options.remove_on_fail {
            state.jobs.remove(key);
        } else if let Some(job) = state.active_mut(key, job_id) {
            job.state = JobState::Failed;
            job.last_error = Some(error.to_string());
        }

        Ok(())
    }

    async fn stats(&self) -> Result<JobQueueStats, QueueError> {
        let state = self.state.read().await;
        let mut stats = JobQueueStats::default();

        for job in state.jobs.values() {
            match job.state {
                JobState::Delayed => stats.delayed += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}
