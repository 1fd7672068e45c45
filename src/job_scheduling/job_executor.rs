//! Delivery worker: turns a due birthday job into exactly one message

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::job_scheduler::JobScheduler;
use super::types::{DeliveryError, DeliveryOutcome, FollowUp, ScheduledJob, SkipReason};
use crate::repositories::{DeliveryLedger, LedgerInsert, PersonStore};
use crate::services::notifier::{BirthdayMessage, BirthdayNotifier};

/// Processes one due job at a time; safe to run many in parallel
///
/// The ledger entry for (person, occurrence day) is claimed before the
/// message is sent, so concurrent deliveries of the same occurrence produce
/// one ledger entry and one message. A failed send withdraws the claim so
/// the retry can deliver.
pub struct DeliveryWorker {
    scheduler: Arc<JobScheduler>,
    ledger: Arc<dyn DeliveryLedger>,
    persons: Arc<dyn PersonStore>,
    notifier: Arc<dyn BirthdayNotifier>,
    operation_timeout: Duration,
}

impl DeliveryWorker {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        ledger: Arc<dyn DeliveryLedger>,
        persons: Arc<dyn PersonStore>,
        notifier: Arc<dyn BirthdayNotifier>,
    ) -> Self {
        let operation_timeout = scheduler.operation_timeout();
        Self {
            scheduler,
            ledger,
            persons,
            notifier,
            operation_timeout,
        }
    }

    /// Deliver one job
    ///
    /// A skip is a success: the job is acknowledged and next year's
    /// occurrence is still scheduled.
    pub async fn process(&self, job: &ScheduledJob) -> Result<DeliveryOutcome, DeliveryError> {
        let person_id = job.payload.person_id;
        let day = job.payload.occurrence_date;
        debug!(
            "Processing job {} (attempt {}/{})",
            job.key, job.attempts_made, job.retry_policy.max_attempts
        );

        if self
            .timed("ledger lookup", self.ledger.exists(person_id, day))
            .await?
        {
            info!(
                "Birthday for person {} on {} already delivered, skipping",
                person_id, day
            );
            let follow_up = self.reschedule(job).await?;
            return Ok(DeliveryOutcome::Skipped {
                reason: SkipReason::AlreadyDelivered,
                follow_up,
            });
        }

        let claim = self
            .timed("ledger insert", self.ledger.insert_if_absent(person_id, day))
            .await?;
        if claim == LedgerInsert::AlreadyPresent {
            info!(
                "Birthday for person {} on {} claimed by another worker, skipping",
                person_id, day
            );
            let follow_up = self.reschedule(job).await?;
            return Ok(DeliveryOutcome::Skipped {
                reason: SkipReason::ClaimRaceLost,
                follow_up,
            });
        }

        let message = BirthdayMessage::from(&job.payload);
        if let Err(e) = self.timed("send", self.notifier.send(&message)).await {
            match self
                .timed("ledger release", self.ledger.release(person_id, day))
                .await
            {
                Ok(_) => debug!("Released ledger claim for person {} on {}", person_id, day),
                Err(release_error) => warn!(
                    "Failed to release ledger claim for person {} on {}: {}",
                    person_id, day, release_error
                ),
            }
            return Err(e);
        }

        info!("Delivered birthday message for person {} on {}", person_id, day);

        let follow_up = self.reschedule(job).await?;
        Ok(DeliveryOutcome::Delivered { follow_up })
    }

    /// Schedule the occurrence after `job` from the current person record
    pub async fn reschedule(&self, job: &ScheduledJob) -> Result<FollowUp, DeliveryError> {
        let person_id = job.payload.person_id;

        let Some(person) = self
            .timed("person lookup", self.persons.get(person_id))
            .await?
        else {
            info!("Person {} no longer exists, not rescheduling", person_id);
            return Ok(FollowUp::PersonRemoved);
        };

        let outcome = self.scheduler.schedule_after(&person, job.due_at).await?;
        Ok(FollowUp::Scheduled(outcome))
    }

    /// Run a collaborator call under the operation timeout
    async fn timed<T, E, F>(&self, operation: &'static str, call: F) -> Result<T, DeliveryError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DeliveryError::retryable(format!("{operation} failed: {e}"))),
            Err(_) => Err(DeliveryError::retryable(format!(
                "{operation} timed out after {:?}",
                self.operation_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::job_queue::{InMemoryJobQueue, JobQueue};
    use crate::job_scheduling::types::{JobKey, ScheduleOutcome};
    use crate::models::Person;
    use crate::repositories::{InMemoryDeliveryLedger, InMemoryPersonStore, MockDeliveryLedger};
    use crate::services::notifier::MockBirthdayNotifier;
    use crate::utils::ManualClock;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    struct Fixture {
        queue: Arc<InMemoryJobQueue>,
        ledger: Arc<InMemoryDeliveryLedger>,
        persons: Arc<InMemoryPersonStore>,
        scheduler: Arc<JobScheduler>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(InMemoryJobQueue::new());
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let persons = Arc::new(InMemoryPersonStore::new());
        // 2025-01-01 09:00 in Jakarta
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap(),
        ));
        let scheduler = Arc::new(JobScheduler::new(
            queue.clone(),
            ledger.clone(),
            persons.clone(),
            clock,
        ));
        Fixture {
            queue,
            ledger,
            persons,
            scheduler,
        }
    }

    fn worker(f: &Fixture, ledger: Arc<dyn DeliveryLedger>, notifier: MockBirthdayNotifier) -> DeliveryWorker {
        DeliveryWorker::new(f.scheduler.clone(), ledger, f.persons.clone(), Arc::new(notifier))
    }

    fn ayu() -> Person {
        let now = Utc::now();
        Person {
            id: Uuid::new_v4(),
            name: "Ayu".to_string(),
            email: "ayu@example.com".to_string(),
            birthdate: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            timezone: "Asia/Jakarta".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The 2025-01-01 job for `person`, as the scheduler would have queued it
    fn due_job(person: &Person) -> ScheduledJob {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut job = ScheduledJob::new(
            JobKey::for_occurrence(person.id, date),
            crate::job_scheduling::BirthdayPayload {
                person_id: person.id,
                name: person.name.clone(),
                email: person.email.clone(),
                timezone: person.timezone.clone(),
                occurrence_date: date,
            },
            Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap(),
            Default::default(),
        );
        job.attempts_made = 1;
        job
    }

    #[tokio::test]
    async fn test_delivers_and_schedules_next_year() {
        let f = fixture();
        let person = ayu();
        f.persons.insert(person.clone()).await;

        let mut notifier = MockBirthdayNotifier::new();
        notifier
            .expect_send()
            .withf(|message| message.text() == "Happy Birthday, Ayu! (ayu@example.com)")
            .times(1)
            .returning(|_| Ok(()));
        let worker = worker(&f, f.ledger.clone(), notifier);

        let outcome = worker.process(&due_job(&person)).await.unwrap();

        let next_key = JobKey::for_occurrence(person.id, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered {
                follow_up: FollowUp::Scheduled(ScheduleOutcome::Enqueued { ref key, .. })
            } if *key == next_key
        ));
        assert_eq!(
            f.ledger.days_for(person.id).await,
            vec![NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()]
        );
        let next = f.queue.lookup(&next_key).await.unwrap().unwrap();
        assert_eq!(next.due_at, Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_ledger_hit_skips_send_but_reschedules() {
        let f = fixture();
        let person = ayu();
        f.persons.insert(person.clone()).await;
        f.ledger
            .insert_if_absent(person.id, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .await
            .unwrap();

        let mut notifier = MockBirthdayNotifier::new();
        notifier.expect_send().never();
        let worker = worker(&f, f.ledger.clone(), notifier);

        let outcome = worker.process(&due_job(&person)).await.unwrap();
        assert!(matches!(
            outcome,
            DeliveryOutcome::Skipped {
                reason: SkipReason::AlreadyDelivered,
                follow_up: FollowUp::Scheduled(_)
            }
        ));
        assert_eq!(f.queue.stats().await.unwrap().delayed, 1);
    }

    #[tokio::test]
    async fn test_lost_claim_is_a_skip() {
        let f = fixture();
        let person = ayu();
        f.persons.insert(person.clone()).await;

        let mut ledger = MockDeliveryLedger::new();
        ledger.expect_exists().returning(|_, _| Ok(false));
        ledger
            .expect_insert_if_absent()
            .returning(|_, _| Ok(LedgerInsert::AlreadyPresent));

        let mut notifier = MockBirthdayNotifier::new();
        notifier.expect_send().never();
        let worker = worker(&f, Arc::new(ledger), notifier);

        let outcome = worker.process(&due_job(&person)).await.unwrap();
        assert!(matches!(
            outcome,
            DeliveryOutcome::Skipped {
                reason: SkipReason::ClaimRaceLost,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_send_failure_releases_claim_and_is_retryable() {
        let f = fixture();
        let person = ayu();
        f.persons.insert(person.clone()).await;

        let mut notifier = MockBirthdayNotifier::new();
        notifier
            .expect_send()
            .returning(|_| Err(anyhow::anyhow!("smtp unavailable")));
        let worker = worker(&f, f.ledger.clone(), notifier);

        let error = worker.process(&due_job(&person)).await.unwrap_err();
        assert!(error.is_retryable());
        assert!(f.ledger.is_empty().await);
        // No follow-up until the message goes out
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_deleted_person_ends_cleanly() {
        let f = fixture();
        let person = ayu();

        let mut notifier = MockBirthdayNotifier::new();
        notifier.expect_send().times(1).returning(|_| Ok(()));
        let worker = worker(&f, f.ledger.clone(), notifier);

        let outcome = worker.process(&due_job(&person)).await.unwrap();
        assert_eq!(outcome.follow_up(), &FollowUp::PersonRemoved);
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_timezone_on_reschedule_is_fatal() {
        let f = fixture();
        let mut person = ayu();
        let job = due_job(&person);
        person.timezone = "Mars/Olympus".to_string();
        f.persons.insert(person).await;

        let mut notifier = MockBirthdayNotifier::new();
        notifier.expect_send().times(1).returning(|_| Ok(()));
        let worker = worker(&f, f.ledger.clone(), notifier);

        let error = worker.process(&job).await.unwrap_err();
        assert!(matches!(error, DeliveryError::Fatal { .. }));
        // The message went out, so the ledger entry stands
        assert!(!f.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_retryable() {
        let f = fixture();
        let person = ayu();

        let mut ledger = MockDeliveryLedger::new();
        ledger.expect_exists().returning(|_, _| {
            Err(crate::errors::RepositoryError::unavailable("database locked"))
        });
        let mut notifier = MockBirthdayNotifier::new();
        notifier.expect_send().never();
        let worker = worker(&f, Arc::new(ledger), notifier);

        let error = worker.process(&due_job(&person)).await.unwrap_err();
        assert!(error.is_retryable());
    }
}
