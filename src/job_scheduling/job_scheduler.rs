//! Job scheduler service for person lifecycle events and reconciliation

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::job_queue::JobQueue;
use super::occurrence::{self, Occurrence};
use super::types::{
    BirthdayPayload, CancelOutcome, DeletionSummary, EnqueueOutcome, JobKey, JobState,
    ReconcileTally, RetryPolicy, ScheduleOutcome, ScheduledJob, SchedulingError,
};
use crate::config::defaults::DEFAULT_OPERATION_TIMEOUT;
use crate::models::Person;
use crate::repositories::{DeliveryLedger, PersonStore};
use crate::utils::Clock;

/// Decides job keys and keeps the queue in line with person records
///
/// Holds no state of its own: the deterministic job key is the only thing
/// that ties a person to a queued job, so every operation can be repeated
/// safely.
pub struct JobScheduler {
    queue: Arc<dyn JobQueue>,
    ledger: Arc<dyn DeliveryLedger>,
    persons: Arc<dyn PersonStore>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    operation_timeout: Duration,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn DeliveryLedger>,
        persons: Arc<dyn PersonStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            ledger,
            persons,
            clock,
            retry_policy: RetryPolicy::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Retry policy attached to every job this scheduler creates
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Upper bound for each queue, ledger and record store call
    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Schedule the next occurrence for a new person
    pub async fn on_person_created(
        &self,
        person: &Person,
    ) -> Result<ScheduleOutcome, SchedulingError> {
        self.schedule_from(person, self.clock.now()).await
    }

    /// Schedule the first occurrence after `reference`, or after now if later
    ///
    /// Used after a delivery so the follow-up is always the next occurrence,
    /// even when the local clock lags behind the queue's due time.
    pub async fn schedule_after(
        &self,
        person: &Person,
        reference: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulingError> {
        let now = self.clock.now();
        self.schedule_from(person, now.max(reference)).await
    }

    /// Move the job if the birthdate or timezone changed
    ///
    /// Returns `Ok(None)` when no scheduling field changed. Removing the old
    /// job is best-effort: if it is already gone, or the old timezone no
    /// longer parses, scheduling the new occurrence still goes ahead.
    pub async fn on_person_updated(
        &self,
        old: &Person,
        new: &Person,
    ) -> Result<Option<ScheduleOutcome>, SchedulingError> {
        if !old.schedule_changed(new) {
            debug!(
                "Person {} changed without affecting the schedule, no action",
                new.id
            );
            return Ok(None);
        }

        match self.expected_job_key(old) {
            Ok(old_key) => match self.timed("cancel", self.queue.cancel(&old_key)).await? {
                CancelOutcome::Removed => info!("Cancelled superseded job {}", old_key),
                CancelOutcome::NotFound => {
                    debug!("Superseded job {} was not queued, nothing to cancel", old_key)
                }
            },
            Err(e) => warn!(
                "Cannot derive previous job key for person {}: {}; reconciliation will remove it",
                old.id, e
            ),
        }

        self.on_person_created(new).await.map(Some)
    }

    /// Cancel every job held for a person and erase their ledger entries
    ///
    /// Jobs are found by person id rather than by the computed key, so a job
    /// for today's occurrence that is waiting for a retry goes as well.
    pub async fn on_person_deleted(
        &self,
        person: &Person,
    ) -> Result<DeletionSummary, SchedulingError> {
        let held = self
            .timed("list jobs", self.queue.jobs(&JobState::ALL))
            .await?;

        let mut job_cancelled = false;
        for job in held.iter().filter(|job| job.person_id() == person.id) {
            let outcome = self.timed("cancel", self.queue.cancel(&job.key)).await?;
            if outcome == CancelOutcome::Removed {
                debug!(
                    "Cancelled {} job {} for deleted person {}",
                    job.state, job.key, person.id
                );
                job_cancelled = true;
            }
        }

        let ledger_entries_removed = self
            .timed("ledger delete", self.ledger.delete_all(person.id))
            .await?;

        info!(
            "Cleared schedule for deleted person {} (job cancelled: {}, ledger entries removed: {})",
            person.id, job_cancelled, ledger_entries_removed
        );

        Ok(DeletionSummary {
            job_cancelled,
            ledger_entries_removed,
        })
    }

    /// Make sure every person has a queued job for their next occurrence
    ///
    /// Safe to re-run at any time. A failure for one person is logged and
    /// counted and the scan moves on; only a failure to read a page aborts.
    pub async fn reconcile_all(&self, page_size: u64) -> Result<ReconcileTally, SchedulingError> {
        if page_size == 0 {
            return Err(SchedulingError::InvalidArgument {
                reason: "page size must be at least 1".to_string(),
            });
        }

        let mut tally = ReconcileTally::default();
        let mut offset = 0u64;

        loop {
            let page = self
                .timed("list persons", self.persons.list(offset, page_size))
                .await?;
            let fetched = page.len() as u64;

            for person in &page {
                tally.total_seen += 1;

                match self.on_person_created(person).await {
                    Ok(ScheduleOutcome::Enqueued { .. }) => tally.newly_scheduled += 1,
                    Ok(ScheduleOutcome::AlreadyScheduled { .. }) => tally.already_scheduled += 1,
                    Err(e @ SchedulingError::InvalidTimezone { .. }) => {
                        warn!("Skipping person {} during reconciliation: {}", person.id, e);
                        tally.skipped_invalid += 1;
                    }
                    Err(e) => {
                        warn!("Failed to reconcile person {}: {}", person.id, e);
                        tally.failed += 1;
                    }
                }
            }

            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        info!(
            "Reconciliation complete: {} seen, {} already scheduled, {} newly scheduled, {} invalid, {} failed",
            tally.total_seen,
            tally.already_scheduled,
            tally.newly_scheduled,
            tally.skipped_invalid,
            tally.failed
        );

        Ok(tally)
    }

    /// Key of the job that should currently exist for `person`
    pub fn expected_job_key(&self, person: &Person) -> Result<JobKey, SchedulingError> {
        let occurrence = self.next_occurrence_for(person, self.clock.now())?;
        Ok(JobKey::for_occurrence(person.id, occurrence.date))
    }

    /// Next occurrence for `person` strictly after `reference`
    pub fn next_occurrence_for(
        &self,
        person: &Person,
        reference: DateTime<Utc>,
    ) -> Result<Occurrence, SchedulingError> {
        let tz = zone_of(person)?;
        Ok(occurrence::next_occurrence(person.birthdate, tz, reference)?)
    }

    async fn schedule_from(
        &self,
        person: &Person,
        reference: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulingError> {
        let occurrence = self.next_occurrence_for(person, reference)?;
        let key = JobKey::for_occurrence(person.id, occurrence.date);

        if self.timed("lookup", self.queue.lookup(&key)).await?.is_some() {
            debug!("Job {} already scheduled, skipping", key);
            return Ok(ScheduleOutcome::AlreadyScheduled { key });
        }

        let job = ScheduledJob::new(
            key.clone(),
            BirthdayPayload {
                person_id: person.id,
                name: person.name.clone(),
                email: person.email.clone(),
                timezone: person.timezone.clone(),
                occurrence_date: occurrence.date,
            },
            occurrence.instant,
            self.retry_policy,
        );

        match self.timed("enqueue", self.queue.enqueue(job)).await? {
            EnqueueOutcome::Enqueued => {
                info!(
                    "Scheduled birthday for person {} at {} ({})",
                    person.id,
                    occurrence.instant.format("%Y-%m-%d %H:%M:%S UTC"),
                    person.timezone
                );
                Ok(ScheduleOutcome::Enqueued {
                    key,
                    due_at: occurrence.instant,
                })
            }
            // Lost a race with a concurrent enqueue of the same occurrence
            EnqueueOutcome::AlreadyExists => Ok(ScheduleOutcome::AlreadyScheduled { key }),
        }
    }

    /// Run a collaborator call under the operation timeout
    pub(crate) async fn timed<T, E, F>(&self, operation: &'static str, call: F) -> Result<T, SchedulingError>
    where
        F: Future<Output = Result<T, E>>,
        SchedulingError: From<E>,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result.map_err(SchedulingError::from),
            Err(_) => Err(SchedulingError::Timeout {
                operation,
                timeout: self.operation_timeout,
            }),
        }
    }
}

fn zone_of(person: &Person) -> Result<Tz, SchedulingError> {
    person.zone().ok_or_else(|| SchedulingError::InvalidTimezone {
        person_id: person.id,
        timezone: person.timezone.clone(),
    })
}
