//! Job scheduling subsystem for the birthday scheduler
//!
//! This module keeps exactly one delayed job per person for their next
//! birthday and delivers each (person, day) greeting at most once.
//!
//! The system is built around five main components:
//! - `JobQueue`: Durable-style job storage keyed by deterministic job keys
//! - `JobScheduler`: Person lifecycle hooks that place and move jobs
//! - `JobQueueRunner`: Polls for due jobs and applies retry policy
//! - `DeliveryWorker`: Claims the delivery ledger and sends the greeting
//! - `ReconciliationService`: Periodic repair of queue state

pub mod job_executor;
pub mod job_queue;
pub mod job_queue_runner;
pub mod job_scheduler;
pub mod occurrence;
pub mod reconciliation;
pub mod types;

pub use job_executor::DeliveryWorker;
pub use job_queue::{InMemoryJobQueue, JobQueue, JobQueueStats, QueueOptions};
pub use job_queue_runner::JobQueueRunner;
pub use job_scheduler::JobScheduler;
pub use occurrence::{
    DELIVERY_HOUR, Occurrence, OccurrenceError, birthday_in_year, next_occurrence,
    occurrence_in_year,
};
pub use reconciliation::{ReconciliationReport, ReconciliationService};
pub use types::*;

#[cfg(test)]
pub use job_queue::MockJobQueue;
