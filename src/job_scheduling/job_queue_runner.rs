//! Job queue runner service for executing due birthday jobs

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::job_executor::DeliveryWorker;
use super::job_queue::JobQueue;
use super::types::{DeliveryError, DeliveryOutcome, FollowUp, QueueError, ScheduledJob};
use crate::config::DeliveryConfig;
use crate::utils::Clock;

/// Polls the queue and feeds due jobs through the delivery worker
///
/// Each poll claims at most `worker_concurrency` jobs and runs them
/// concurrently. Outcomes are settled against the job's retry policy:
/// retryable failures go back to the queue with exponential backoff until
/// the attempt ceiling, after which the job is marked failed and logged.
pub struct JobQueueRunner {
    queue: Arc<dyn JobQueue>,
    worker: Arc<DeliveryWorker>,
    clock: Arc<dyn Clock>,
    worker_concurrency: usize,
    poll_interval: Duration,
}

impl JobQueueRunner {
    /// Create a new job queue runner with configuration
    pub fn new(
        queue: Arc<dyn JobQueue>,
        worker: Arc<DeliveryWorker>,
        clock: Arc<dyn Clock>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            worker,
            clock,
            worker_concurrency: config.worker_concurrency.max(1),
            poll_interval: config.poll_interval,
        }
    }

    /// Run the job queue runner service
    pub async fn run(&self, cancellation_token: tokio_util::sync::CancellationToken) -> Result<()> {
        info!(
            "Starting job queue runner service (concurrency: {}, poll interval: {:?})",
            self.worker_concurrency, self.poll_interval
        );
        let mut execution_check = interval(self.poll_interval);
        execution_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = execution_check.tick() => {
                    if let Err(e) = self.process_pending_jobs().await {
                        error!("Error processing pending jobs: {}", e);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Job queue runner received cancellation signal");
                    break;
                }
            }
        }

        info!("Job queue runner service stopped");
        Ok(())
    }

    /// Claim and process one batch of due jobs, returning how many ran
    pub async fn process_pending_jobs(&self) -> Result<usize, QueueError> {
        let now = self.clock.now();
        let jobs = self.queue.claim_due(now, self.worker_concurrency).await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        debug!("Found {} jobs ready for execution", jobs.len());

        let results = join_all(jobs.iter().map(|job| self.worker.process(job))).await;

        for (job, result) in jobs.iter().zip(results) {
            self.settle(job, result).await;
        }

        Ok(jobs.len())
    }

    /// Record the outcome of one attempt in the queue
    async fn settle(&self, job: &ScheduledJob, result: Result<DeliveryOutcome, DeliveryError>) {
        match result {
            Ok(outcome) => {
                info!("Job {} completed: {}", job.key, describe(&outcome));
                if let Err(e) = self.queue.complete(&job.key, job.id).await {
                    error!("Failed to mark job {} as completed: {}", job.key, e);
                }
            }
            Err(e) if e.is_retryable() && job.retry_policy.allows_retry(job.attempts_made) => {
                let delay = job.retry_policy.delay_for(job.attempts_made);
                let next_due = self.clock.now() + delay;
                warn!(
                    "Job {} attempt {}/{} failed: {}; retrying at {}",
                    job.key,
                    job.attempts_made,
                    job.retry_policy.max_attempts,
                    e,
                    next_due.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if let Err(queue_error) = self
                    .queue
                    .retry(&job.key, job.id, next_due, &e.to_string())
                    .await
                {
                    error!("Failed to requeue job {}: {}", job.key, queue_error);
                }
            }
            Err(e) => {
                error!(
                    "Final failure for job {} after {} attempts: {}",
                    job.key, job.attempts_made, e
                );
                if let Err(queue_error) = self.queue.fail(&job.key, job.id, &e.to_string()).await {
                    error!("Failed to mark job {} as failed: {}", job.key, queue_error);
                }
                self.keep_next_occurrence(job).await;
            }
        }
    }

    /// A failed delivery must not drop the person from future years
    async fn keep_next_occurrence(&self, job: &ScheduledJob) {
        match self.worker.reschedule(job).await {
            Ok(FollowUp::Scheduled(outcome)) => {
                debug!("Next occurrence after failed job {} is {}", job.key, outcome.key())
            }
            Ok(FollowUp::PersonRemoved) => {}
            Err(e) => warn!(
                "Could not schedule next occurrence after failed job {}: {}; reconciliation will retry",
                job.key, e
            ),
        }
    }
}

fn describe(outcome: &DeliveryOutcome) -> String {
    let follow_up = match outcome.follow_up() {
        FollowUp::Scheduled(scheduled) => format!("next job {}", scheduled.key()),
        FollowUp::PersonRemoved => "person removed".to_string(),
    };
    match outcome {
        DeliveryOutcome::Delivered { .. } => format!("delivered, {follow_up}"),
        DeliveryOutcome::Skipped { reason, .. } => format!("skipped ({reason:?}), {follow_up}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::job_queue::InMemoryJobQueue;
    use crate::job_scheduling::job_scheduler::JobScheduler;
    use crate::job_scheduling::types::{JobKey, JobState};
    use crate::models::Person;
    use crate::repositories::{InMemoryDeliveryLedger, InMemoryPersonStore};
    use crate::services::notifier::{BirthdayMessage, BirthdayNotifier};
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;
    use uuid::Uuid;

    /// Fails the first `failures` sends, then succeeds
    #[derive(Default)]
    struct FlakyNotifier {
        failures: usize,
        calls: AtomicUsize,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl BirthdayNotifier for FlakyNotifier {
        async fn send(&self, _message: &BirthdayMessage) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                anyhow::bail!("transport error on call {call}");
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        runner: JobQueueRunner,
        scheduler: Arc<JobScheduler>,
        queue: Arc<InMemoryJobQueue>,
        ledger: Arc<InMemoryDeliveryLedger>,
        persons: Arc<InMemoryPersonStore>,
        clock: Arc<ManualClock>,
        notifier: Arc<FlakyNotifier>,
    }

    fn harness(failures: usize, config: DeliveryConfig) -> Harness {
        let queue = Arc::new(InMemoryJobQueue::new());
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let persons = Arc::new(InMemoryPersonStore::new());
        // 2024-12-31 08:00 in Jakarta
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 12, 31, 1, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(FlakyNotifier {
            failures,
            ..Default::default()
        });
        let scheduler = Arc::new(
            JobScheduler::new(queue.clone(), ledger.clone(), persons.clone(), clock.clone())
                .with_retry_policy(config.retry_policy()),
        );
        let worker = Arc::new(DeliveryWorker::new(
            scheduler.clone(),
            ledger.clone(),
            persons.clone(),
            notifier.clone(),
        ));
        let runner = JobQueueRunner::new(queue.clone(), worker, clock.clone(), &config);

        Harness {
            runner,
            scheduler,
            queue,
            ledger,
            persons,
            clock,
            notifier,
        }
    }

    fn person(birthdate: NaiveDate) -> Person {
        let now = Utc::now();
        Person {
            id: Uuid::new_v4(),
            name: "Ayu".to_string(),
            email: "ayu@example.com".to_string(),
            birthdate,
            timezone: "Asia/Jakarta".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn jan_first(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_due_processes_nothing() {
        let h = harness(0, DeliveryConfig::default());
        let ayu = person(jan_first(1990));
        h.persons.insert(ayu.clone()).await;
        h.scheduler.on_person_created(&ayu).await.unwrap();

        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 0);
        assert_eq!(h.queue.stats().await.unwrap().delayed, 1);
    }

    #[tokio::test]
    async fn test_two_failures_then_success_delivers_once() {
        let h = harness(2, DeliveryConfig::default());
        let ayu = person(jan_first(1990));
        h.persons.insert(ayu.clone()).await;
        let scheduled = h.scheduler.on_person_created(&ayu).await.unwrap();

        // 2025-01-01 09:00 Jakarta
        h.clock.set(Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap());
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 1);
        let held = h.queue.lookup(scheduled.key()).await.unwrap().unwrap();
        assert_eq!(held.state, JobState::Delayed);
        assert_eq!(held.due_at, h.clock.now() + chrono::Duration::seconds(60));

        // Not due again until the backoff has passed
        h.clock.advance(chrono::Duration::seconds(59));
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 0);

        h.clock.advance(chrono::Duration::seconds(1));
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 1);
        let held = h.queue.lookup(scheduled.key()).await.unwrap().unwrap();
        assert_eq!(held.due_at, h.clock.now() + chrono::Duration::seconds(120));

        h.clock.advance(chrono::Duration::seconds(120));
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 1);

        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 1);
        assert_eq!(h.ledger.days_for(ayu.id).await, vec![jan_first(2025)]);
        assert!(h.queue.lookup(scheduled.key()).await.unwrap().is_none());
        let next = JobKey::for_occurrence(ayu.id, jan_first(2026));
        assert!(h.queue.lookup(&next).await.unwrap().is_some());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_exhausted_attempts_fail_and_keep_next_year() {
        let h = harness(usize::MAX, DeliveryConfig::default());
        let ayu = person(jan_first(1990));
        h.persons.insert(ayu.clone()).await;
        let scheduled = h.scheduler.on_person_created(&ayu).await.unwrap();

        h.clock.set(Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap());
        h.runner.process_pending_jobs().await.unwrap();
        h.clock.advance(chrono::Duration::seconds(60));
        h.runner.process_pending_jobs().await.unwrap();
        h.clock.advance(chrono::Duration::seconds(120));
        h.runner.process_pending_jobs().await.unwrap();

        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 3);
        let failed = h.queue.lookup(scheduled.key()).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.attempts_made, 3);
        assert!(failed.last_error.is_some());

        // No further attempts for the failed job
        h.clock.advance(chrono::Duration::hours(1));
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 0);

        assert!(h.ledger.is_empty().await);
        let next = JobKey::for_occurrence(ayu.id, jan_first(2026));
        assert!(h.queue.lookup(&next).await.unwrap().is_some());
        assert!(logs_contain("Final failure for job"));
    }

    #[tokio::test]
    async fn test_batch_is_bounded_by_concurrency() {
        let config = DeliveryConfig {
            worker_concurrency: 2,
            ..Default::default()
        };
        let h = harness(0, config);
        for _ in 0..5 {
            let p = person(jan_first(1990));
            h.persons.insert(p.clone()).await;
            h.scheduler.on_person_created(&p).await.unwrap();
        }

        h.clock.set(Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap());
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 2);
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 2);
        assert_eq!(h.runner.process_pending_jobs().await.unwrap(), 1);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let h = harness(0, DeliveryConfig::default());
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();

        h.runner.run(token).await.unwrap();
    }
}
