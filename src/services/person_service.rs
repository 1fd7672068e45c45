//! Person record management
//!
//! Every write to the record store is followed by the matching scheduler
//! hook. A failing hook is logged and the write stands; reconciliation
//! closes the gap on its next pass.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::job_scheduling::JobScheduler;
use crate::models::{Person, PersonCreateRequest, PersonUpdateRequest};
use crate::repositories::PersonStore;

pub struct PersonService {
    persons: Arc<dyn PersonStore>,
    scheduler: Arc<JobScheduler>,
}

impl PersonService {
    pub fn new(persons: Arc<dyn PersonStore>, scheduler: Arc<JobScheduler>) -> Self {
        Self { persons, scheduler }
    }

    /// Validate and store a new person, then schedule their next birthday
    pub async fn create(&self, request: PersonCreateRequest) -> AppResult<Person> {
        let new_person = request.validate()?;
        let person = self.persons.create(new_person).await?;
        info!("Created person {} ({})", person.id, person.name);

        if let Err(e) = self.scheduler.on_person_created(&person).await {
            warn!(
                "Failed to schedule birthday for new person {}: {}; reconciliation will retry",
                person.id, e
            );
        }

        Ok(person)
    }

    /// Apply the provided fields, moving the scheduled job if needed
    pub async fn update(&self, id: Uuid, request: PersonUpdateRequest) -> AppResult<Person> {
        let changes = request.validate()?;
        let old = self.get(id).await?;

        let updated = self
            .persons
            .update(id, changes)
            .await?
            .ok_or_else(|| AppError::not_found("person", id))?;
        info!("Updated person {}", id);

        if let Err(e) = self.scheduler.on_person_updated(&old, &updated).await {
            warn!(
                "Failed to reschedule birthday for person {}: {}; reconciliation will retry",
                id, e
            );
        }

        Ok(updated)
    }

    /// Remove a person with their queued job and delivery history
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let person = self.get(id).await?;

        if !self.persons.delete(id).await? {
            return Err(AppError::not_found("person", id));
        }
        info!("Deleted person {}", id);

        if let Err(e) = self.scheduler.on_person_deleted(&person).await {
            warn!(
                "Failed to clear schedule for deleted person {}: {}; stale job cleanup will retry",
                id, e
            );
        }

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Person> {
        self.persons
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("person", id))
    }

    pub async fn list(&self, offset: u64, limit: u64) -> AppResult<Vec<Person>> {
        Ok(self.persons.list(offset, limit).await?)
    }
}
