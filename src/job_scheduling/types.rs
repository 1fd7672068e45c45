//! Job scheduling type definitions

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::job_scheduling::occurrence::OccurrenceError;

/// Deterministic identity of one birthday occurrence
///
/// Two jobs for the same person and the same occurrence date always share a
/// key, while this year's and next year's occurrence never do. The queue
/// deduplicates on this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Generate the key for a person's occurrence on `date`
    pub fn for_occurrence(person_id: Uuid, date: NaiveDate) -> Self {
        Self(format!("birthday:{person_id}:{}", date.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data carried by a birthday job, captured when the job was scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayPayload {
    pub person_id: Uuid,
    pub name: String,
    pub email: String,
    pub timezone: String,
    /// Local calendar day of the occurrence; also the ledger day
    pub occurrence_date: NaiveDate,
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its due time (also used while waiting for a retry)
    Delayed,
    /// Claimed by the runner and being processed
    Active,
    /// Processed successfully and retained
    Completed,
    /// Exhausted its attempts or failed fatally, retained for inspection
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Delayed,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
    ];
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Delay strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay after every failure
    Fixed {
        #[serde(with = "crate::config::duration_serde::duration")]
        delay: std::time::Duration,
    },
    /// `base * 2^(attempt - 1)`
    Exponential {
        #[serde(with = "crate::config::duration_serde::duration")]
        base: std::time::Duration,
    },
}

/// Retry policy attached to every job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base: std::time::Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base },
        }
    }

    /// Delay before the next attempt after `attempt` (1-based) has failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { base } => {
                let exponent = attempt.saturating_sub(1).min(20);
                base.saturating_mul(1u32 << exponent)
            }
        };
        Duration::from_std(delay).unwrap_or(Duration::MAX)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(
            crate::config::defaults::DEFAULT_MAX_ATTEMPTS,
            crate::config::defaults::DEFAULT_BACKOFF_BASE,
        )
    }
}

/// A job held by the delayed queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique job instance identifier
    pub id: Uuid,
    pub key: JobKey,
    pub payload: BirthdayPayload,
    /// When this job should next be executed
    pub due_at: DateTime<Utc>,
    pub retry_policy: RetryPolicy,
    pub attempts_made: u32,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl ScheduledJob {
    /// Create a new delayed job
    pub fn new(
        key: JobKey,
        payload: BirthdayPayload,
        due_at: DateTime<Utc>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            payload,
            due_at,
            retry_policy,
            attempts_made: 0,
            state: JobState::Delayed,
            last_error: None,
        }
    }

    pub fn person_id(&self) -> Uuid {
        self.payload.person_id
    }

    /// Check if this job is ready to run
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Delayed && self.due_at <= now
    }
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ScheduledJob {}

/// Result of adding a job to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A job with the same key is already held; nothing changed
    AlreadyExists,
}

/// Result of removing a job from the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Removed,
    NotFound,
}

/// Result of a scheduling call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Enqueued { key: JobKey, due_at: DateTime<Utc> },
    AlreadyScheduled { key: JobKey },
}

impl ScheduleOutcome {
    pub fn key(&self) -> &JobKey {
        match self {
            ScheduleOutcome::Enqueued { key, .. } | ScheduleOutcome::AlreadyScheduled { key } => key,
        }
    }
}

/// What was cleaned up for a deleted person
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub job_cancelled: bool,
    pub ledger_entries_removed: u64,
}

/// Counters from a full reconciliation scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileTally {
    pub total_seen: u64,
    pub already_scheduled: u64,
    pub newly_scheduled: u64,
    /// Records whose timezone no longer parses
    pub skipped_invalid: u64,
    /// Records whose scheduling call failed; retried on the next pass
    pub failed: u64,
}

/// Counters from a stale job sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub inspected: u64,
    pub removed: u64,
}

/// Why a delivery was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger already held the (person, day) entry
    AlreadyDelivered,
    /// Another worker claimed the same (person, day) first
    ClaimRaceLost,
}

/// What happened after the delivery step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Scheduled(ScheduleOutcome),
    /// The person was deleted while the job was in flight
    PersonRemoved,
}

/// Successful outcome of processing one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { follow_up: FollowUp },
    Skipped { reason: SkipReason, follow_up: FollowUp },
}

impl DeliveryOutcome {
    pub fn follow_up(&self) -> &FollowUp {
        match self {
            DeliveryOutcome::Delivered { follow_up } | DeliveryOutcome::Skipped { follow_up, .. } => {
                follow_up
            }
        }
    }
}

/// Queue backend errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Queue backend cannot be reached
    #[error("Job queue unavailable: {message}")]
    Unavailable { message: String },
}

impl QueueError {
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors that can occur in the job scheduling system
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// Stored timezone does not name an IANA zone
    #[error("Invalid timezone '{timezone}' for person {person_id}")]
    InvalidTimezone { person_id: Uuid, timezone: String },

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Occurrence could not be computed
    #[error(transparent)]
    Occurrence(#[from] OccurrenceError),

    /// Queue operation failed
    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),

    /// Record store or ledger operation failed
    #[error("Store operation failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Collaborator call exceeded the operation timeout
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: std::time::Duration,
    },
}

impl SchedulingError {
    /// Whether retrying the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulingError::Queue(_) | SchedulingError::Timeout { .. } => true,
            SchedulingError::Repository(e) => e.is_transient(),
            SchedulingError::InvalidTimezone { .. }
            | SchedulingError::InvalidArgument { .. }
            | SchedulingError::Occurrence(_) => false,
        }
    }
}

/// Failure of one delivery attempt, classified for the retry policy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Another attempt may succeed
    #[error("Retryable delivery failure: {reason}")]
    Retryable { reason: String },

    /// No further attempt will succeed
    #[error("Fatal delivery failure: {reason}")]
    Fatal { reason: String },
}

impl DeliveryError {
    pub fn retryable<S: Into<String>>(reason: S) -> Self {
        Self::Retryable {
            reason: reason.into(),
        }
    }

    pub fn fatal<S: Into<String>>(reason: S) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retryable { .. })
    }
}

impl From<SchedulingError> for DeliveryError {
    fn from(error: SchedulingError) -> Self {
        if error.is_retryable() {
            DeliveryError::retryable(error.to_string())
        } else {
            DeliveryError::fatal(error.to_string())
        }
    }
}
