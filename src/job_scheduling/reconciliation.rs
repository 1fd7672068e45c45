//! Periodic repair of queue state against the person records
//!
//! The lifecycle hooks keep the queue right in the common case. This service
//! covers everything else: jobs lost in a restart, a crash between cancel
//! and re-enqueue, edits made behind the service's back, and jobs left for
//! people who no longer exist.

use anyhow::{Context, Result};
use chrono::Datelike;
use cron::Schedule;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job_queue::JobQueue;
use super::job_scheduler::JobScheduler;
use super::occurrence::birthday_in_year;
use super::types::{CancelOutcome, CleanupReport, JobState, ReconcileTally, ScheduledJob, SchedulingError};
use crate::config::ReconciliationConfig;
use crate::models::Person;
use crate::repositories::PersonStore;

/// Counters from one full reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub stale: CleanupReport,
    pub superseded: CleanupReport,
    pub tally: ReconcileTally,
}

pub struct ReconciliationService {
    scheduler: Arc<JobScheduler>,
    queue: Arc<dyn JobQueue>,
    persons: Arc<dyn PersonStore>,
    config: ReconciliationConfig,
    page_size: u64,
}

impl ReconciliationService {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        queue: Arc<dyn JobQueue>,
        persons: Arc<dyn PersonStore>,
        config: ReconciliationConfig,
        page_size: u64,
    ) -> Self {
        Self {
            scheduler,
            queue,
            persons,
            config,
            page_size,
        }
    }

    /// Remove queued jobs, in any state, whose person no longer exists
    pub async fn cleanup_stale_jobs(&self) -> Result<CleanupReport, SchedulingError> {
        // Jobs first: a person created after this point has no job in the list
        let jobs = self
            .scheduler
            .timed("list jobs", self.queue.jobs(&JobState::ALL))
            .await?;
        let valid_ids = self.valid_person_ids().await?;

        let mut report = CleanupReport::default();
        for job in &jobs {
            report.inspected += 1;
            if valid_ids.contains(&job.person_id()) {
                continue;
            }
            // Offset paging skips a record when another is deleted mid-scan
            let person = self
                .scheduler
                .timed("person lookup", self.persons.get(job.person_id()))
                .await?;
            if person.is_some() {
                debug!(
                    "Person {} missed by the id scan still exists, keeping job {}",
                    job.person_id(),
                    job.key
                );
                continue;
            }
            if self.remove(job).await? {
                info!(
                    "Removed stale {} job {} for missing person {}",
                    job.state,
                    job.key,
                    job.person_id()
                );
                report.removed += 1;
            }
        }

        info!(
            "Stale job cleanup complete: {} inspected, {} removed",
            report.inspected, report.removed
        );
        Ok(report)
    }

    /// Remove delayed jobs that no longer describe an occurrence of their person
    ///
    /// A job is superseded when its timezone differs from the record's, or
    /// its occurrence date is not the record's birthday in that year. A job
    /// waiting for a retry of the current occurrence still matches.
    pub async fn cleanup_superseded_jobs(&self) -> Result<CleanupReport, SchedulingError> {
        let jobs = self
            .scheduler
            .timed("list jobs", self.queue.jobs(&[JobState::Delayed]))
            .await?;

        let mut report = CleanupReport::default();
        for job in &jobs {
            report.inspected += 1;

            let person = self
                .scheduler
                .timed("person lookup", self.persons.get(job.person_id()))
                .await?;
            // Missing persons are handled by the stale job sweep
            let Some(person) = person else {
                continue;
            };

            if !is_superseded(job, &person) {
                continue;
            }
            if self.remove(job).await? {
                info!(
                    "Removed superseded job {} for person {} (record now {} in {})",
                    job.key, person.id, person.birthdate, person.timezone
                );
                report.removed += 1;
            }
        }

        debug!(
            "Superseded job cleanup complete: {} inspected, {} removed",
            report.inspected, report.removed
        );
        Ok(report)
    }

    /// Run both cleanups, then make sure every person has their next job
    pub async fn run_pass(&self) -> Result<ReconciliationReport, SchedulingError> {
        let stale = self.cleanup_stale_jobs().await?;
        let superseded = if self.config.remove_superseded_jobs {
            self.cleanup_superseded_jobs().await?
        } else {
            CleanupReport::default()
        };
        let tally = self.scheduler.reconcile_all(self.page_size).await?;

        Ok(ReconciliationReport {
            stale,
            superseded,
            tally,
        })
    }

    /// Run the reconciliation service
    ///
    /// Runs a pass at startup when `run_on_startup` is set and, when
    /// `enabled`, every time the cron expression fires.
    pub async fn run(&self, cancellation_token: tokio_util::sync::CancellationToken) -> Result<()> {
        if self.config.run_on_startup {
            info!("Running startup reconciliation");
            self.run_pass_logged().await;
        }

        if !self.config.enabled {
            info!("Periodic reconciliation disabled");
            return Ok(());
        }

        let schedule = Schedule::from_str(&self.config.cron).with_context(|| {
            format!("Invalid reconciliation cron expression '{}'", self.config.cron)
        })?;
        info!("Starting reconciliation service (cron: '{}')", self.config.cron);

        loop {
            let now = self.scheduler.clock().now();
            let Some(next_run) = schedule.after(&now).next() else {
                warn!("Reconciliation cron '{}' has no upcoming runs", self.config.cron);
                break;
            };
            let wait = (next_run - now).to_std().unwrap_or(Duration::ZERO);
            debug!(
                "Next reconciliation at {}",
                next_run.format("%Y-%m-%d %H:%M:%S UTC")
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.run_pass_logged().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Reconciliation service received cancellation signal, shutting down");
                    break;
                }
            }
        }

        info!("Reconciliation service stopped");
        Ok(())
    }

    async fn run_pass_logged(&self) {
        match self.run_pass().await {
            Ok(report) => info!(
                "Reconciliation pass finished: {} stale and {} superseded jobs removed, {} newly scheduled",
                report.stale.removed, report.superseded.removed, report.tally.newly_scheduled
            ),
            Err(e) => error!("Reconciliation pass failed: {}", e),
        }
    }

    async fn valid_person_ids(&self) -> Result<HashSet<Uuid>, SchedulingError> {
        let page_size = self.page_size.max(1);
        let mut ids = HashSet::new();
        let mut offset = 0u64;

        loop {
            let page = self
                .scheduler
                .timed("list persons", self.persons.list(offset, page_size))
                .await?;
            let fetched = page.len() as u64;
            ids.extend(page.into_iter().map(|person| person.id));

            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        Ok(ids)
    }

    async fn remove(&self, job: &ScheduledJob) -> Result<bool, SchedulingError> {
        let outcome = self
            .scheduler
            .timed("cancel", self.queue.cancel(&job.key))
            .await?;
        if outcome == CancelOutcome::NotFound {
            debug!("Job {} already gone", job.key);
        }
        Ok(outcome == CancelOutcome::Removed)
    }
}

fn is_superseded(job: &ScheduledJob, person: &Person) -> bool {
    if job.payload.timezone != person.timezone {
        return true;
    }
    let year = job.payload.occurrence_date.year();
    birthday_in_year(person.birthdate, year) != Some(job.payload.occurrence_date)
}
