//! End-to-end scheduling and delivery scenarios
//!
//! Drives the public API with in-memory stores, a manual clock and a
//! recording notifier, so every scenario is deterministic.

use async_trait::async_trait;
use birthday_scheduler::{
    config::DeliveryConfig,
    job_scheduling::{
        DeliveryOutcome, DeliveryWorker, FollowUp, InMemoryJobQueue, JobKey, JobQueue,
        JobQueueRunner, JobScheduler, JobState, ScheduleOutcome,
    },
    models::Person,
    repositories::{InMemoryDeliveryLedger, InMemoryPersonStore},
    services::{BirthdayMessage, BirthdayNotifier},
    utils::{Clock, ManualClock},
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Jakarta;
use rstest::rstest;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<BirthdayMessage>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<BirthdayMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BirthdayNotifier for RecordingNotifier {
    async fn send(&self, message: &BirthdayMessage) -> anyhow::Result<()> {
        // Yield so concurrent deliveries interleave
        tokio::task::yield_now().await;
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    queue: Arc<InMemoryJobQueue>,
    ledger: Arc<InMemoryDeliveryLedger>,
    persons: Arc<InMemoryPersonStore>,
    notifier: Arc<RecordingNotifier>,
    scheduler: Arc<JobScheduler>,
}

impl Harness {
    fn new(now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let queue = Arc::new(InMemoryJobQueue::new());
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let persons = Arc::new(InMemoryPersonStore::new());
        let scheduler = Arc::new(JobScheduler::new(
            queue.clone(),
            ledger.clone(),
            persons.clone(),
            clock.clone(),
        ));
        Self {
            clock,
            queue,
            ledger,
            persons,
            notifier: Arc::new(RecordingNotifier::default()),
            scheduler,
        }
    }

    fn worker(&self) -> Arc<DeliveryWorker> {
        Arc::new(DeliveryWorker::new(
            self.scheduler.clone(),
            self.ledger.clone(),
            self.persons.clone(),
            self.notifier.clone(),
        ))
    }

    fn runner(&self) -> JobQueueRunner {
        JobQueueRunner::new(
            self.queue.clone(),
            self.worker(),
            self.clock.clone(),
            &DeliveryConfig::default(),
        )
    }

    async fn add_person(&self, birthdate: NaiveDate, timezone: &str) -> Person {
        let now = self.clock.now();
        let person = Person {
            id: Uuid::new_v4(),
            name: "Ayu".to_string(),
            email: "ayu@example.com".to_string(),
            birthdate,
            timezone: timezone.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.persons.insert(person.clone()).await;
        person
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn jakarta(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Jakarta
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

#[rstest]
#[case::before_nine(0, date(2024, 1, 1))]
#[case::after_nine(10, date(2025, 1, 1))]
#[tokio::test]
async fn test_first_occurrence_depends_on_creation_time(
    #[case] created_hour: u32,
    #[case] expected: NaiveDate,
) {
    let h = Harness::new(jakarta(2024, 1, 1, created_hour));
    let ayu = h.add_person(date(1990, 1, 1), "Asia/Jakarta").await;

    let outcome = h.scheduler.on_person_created(&ayu).await.unwrap();

    let expected_due = Jakarta
        .from_local_datetime(&expected.and_hms_opt(9, 0, 0).unwrap())
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(
        outcome,
        ScheduleOutcome::Enqueued {
            key: JobKey::for_occurrence(ayu.id, expected),
            due_at: expected_due,
        }
    );
}

#[tokio::test]
async fn test_create_twice_queues_one_job() {
    let h = Harness::new(jakarta(2024, 1, 1, 0));
    let ayu = h.add_person(date(1990, 1, 1), "Asia/Jakarta").await;

    let first = h.scheduler.on_person_created(&ayu).await.unwrap();
    let second = h.scheduler.on_person_created(&ayu).await.unwrap();

    assert!(matches!(second, ScheduleOutcome::AlreadyScheduled { .. }));
    assert_eq!(first.key(), second.key());
    assert_eq!(h.queue.len().await, 1);
}

#[tokio::test]
async fn test_delivery_once_then_duplicate_skipped() {
    let h = Harness::new(jakarta(2024, 1, 1, 10));
    let ayu = h.add_person(date(1990, 1, 1), "Asia/Jakarta").await;
    let scheduled = h.scheduler.on_person_created(&ayu).await.unwrap();
    let job = h.queue.lookup(scheduled.key()).await.unwrap().unwrap();

    h.clock.set(jakarta(2025, 1, 1, 9));
    let processed = h.runner().process_pending_jobs().await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.ledger.days_for(ayu.id).await, vec![date(2025, 1, 1)]);

    // The queue hands the same job out again
    let duplicate = h.worker().process(&job).await.unwrap();
    assert!(matches!(duplicate, DeliveryOutcome::Skipped { .. }));
    assert_eq!(h.notifier.sent().len(), 1);

    let next_key = JobKey::for_occurrence(ayu.id, date(2026, 1, 1));
    let delayed = h.queue.jobs(&[JobState::Delayed]).await.unwrap();
    assert_eq!(delayed.len(), 1);
    assert_eq!(delayed[0].key, next_key);
    assert_eq!(delayed[0].due_at, jakarta(2026, 1, 1, 9));
}

#[tokio::test]
async fn test_concurrent_delivery_sends_once() {
    let h = Harness::new(jakarta(2024, 12, 31, 12));
    let ayu = h.add_person(date(1990, 1, 1), "Asia/Jakarta").await;
    let scheduled = h.scheduler.on_person_created(&ayu).await.unwrap();
    let job = h.queue.lookup(scheduled.key()).await.unwrap().unwrap();
    h.clock.set(jakarta(2025, 1, 1, 9));

    let (first_worker, second_worker) = (h.worker(), h.worker());
    let (first, second) = tokio::join!(first_worker.process(&job), second_worker.process(&job));
    let outcomes = [first.unwrap(), second.unwrap()];

    let delivered = outcomes
        .iter()
        .filter(|o| matches!(o, DeliveryOutcome::Delivered { .. }))
        .count();
    assert_eq!(delivered, 1);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.ledger.len().await, 1);
    for outcome in &outcomes {
        assert!(matches!(outcome.follow_up(), FollowUp::Scheduled(_)));
    }
}

#[tokio::test]
async fn test_birthdate_edit_moves_job() {
    let h = Harness::new(jakarta(2024, 1, 1, 0));
    let old = h.add_person(date(1990, 3, 10), "Asia/Jakarta").await;
    let old_key = h.scheduler.on_person_created(&old).await.unwrap().key().clone();

    let mut new = old.clone();
    new.birthdate = date(1990, 7, 20);
    let moved = h.scheduler.on_person_updated(&old, &new).await.unwrap().unwrap();

    assert!(h.queue.lookup(&old_key).await.unwrap().is_none());
    let job = h.queue.lookup(moved.key()).await.unwrap().unwrap();
    assert_eq!(job.due_at, jakarta(2024, 7, 20, 9));

    // Unrelated edits leave the job alone
    let mut renamed = new.clone();
    renamed.name = "Ayu Lestari".to_string();
    assert!(h.scheduler.on_person_updated(&new, &renamed).await.unwrap().is_none());
    assert_eq!(h.queue.lookup(moved.key()).await.unwrap().unwrap().id, job.id);
}

#[tokio::test]
async fn test_delete_removes_job_and_history() {
    let h = Harness::new(jakarta(2024, 12, 31, 12));
    let ayu = h.add_person(date(1990, 1, 1), "Asia/Jakarta").await;
    h.scheduler.on_person_created(&ayu).await.unwrap();
    h.clock.set(jakarta(2025, 1, 1, 9));
    h.runner().process_pending_jobs().await.unwrap();
    assert_eq!(h.queue.len().await, 1);

    let summary = h.scheduler.on_person_deleted(&ayu).await.unwrap();

    assert!(summary.job_cancelled);
    assert_eq!(summary.ledger_entries_removed, 1);
    assert!(h.queue.is_empty().await);
    assert!(h.ledger.is_empty().await);
}

#[tokio::test]
async fn test_reconcile_all_converges() {
    let h = Harness::new(jakarta(2024, 1, 1, 0));
    for day in 1..=5 {
        h.add_person(date(1990, 5, day), "Asia/Jakarta").await;
    }
    h.add_person(date(1990, 5, 6), "Not/AZone").await;

    let first = h.scheduler.reconcile_all(2).await.unwrap();
    assert_eq!(first.total_seen, 6);
    assert_eq!(first.newly_scheduled, 5);
    assert_eq!(first.skipped_invalid, 1);

    let second = h.scheduler.reconcile_all(2).await.unwrap();
    assert_eq!(second.newly_scheduled, 0);
    assert_eq!(second.already_scheduled, 5);
    assert_eq!(h.queue.len().await, 5);
}
