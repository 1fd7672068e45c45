//! Repository trait definitions
//!
//! This module defines the storage contracts the scheduling engine depends
//! on. Each has an in-memory implementation in [`super::memory`] and a
//! SeaORM implementation in [`crate::database::repositories`].

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::errors::RepositoryResult;
use crate::models::{NewPerson, Person, PersonChanges};

/// Source of truth for person records
///
/// # Examples
///
/// ```rust,ignore
/// use birthday_scheduler::repositories::PersonStore;
///
/// async fn first_page(store: &dyn PersonStore) -> RepositoryResult<usize> {
///     Ok(store.list(0, 100).await?.len())
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonStore: Send + Sync {
    /// Find a person by ID
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Person))` - Person found
    /// * `Ok(None)` - Person not found
    /// * `Err(RepositoryError)` - Database or other error
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Person>>;

    /// List one page of persons
    ///
    /// Ordering is stable (`created_at`, then `id`) so offset paging visits
    /// every record present for the whole scan exactly once.
    ///
    /// # Arguments
    ///
    /// * `offset` - Number of records to skip
    /// * `limit` - Maximum number of records to return
    async fn list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<Person>>;

    /// Store a new person with a generated ID and timestamps
    async fn create(&self, person: NewPerson) -> RepositoryResult<Person>;

    /// Apply a partial update
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Person))` - Updated record
    /// * `Ok(None)` - No person with that ID
    async fn update(&self, id: Uuid, changes: PersonChanges) -> RepositoryResult<Option<Person>>;

    /// Delete a person
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Person was deleted
    /// * `Ok(false)` - Person was not found
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Total number of persons
    async fn count(&self) -> RepositoryResult<u64>;
}

/// Result of claiming a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    /// This caller created the entry
    Inserted,
    /// An entry for the same (person, day) already existed
    AlreadyPresent,
}

/// Durable record of "birthday message sent for (person, day)"
///
/// The (person, day) pair is unique. Implementations must enforce that in
/// the store itself so concurrent callers converge on a single
/// [`LedgerInsert::Inserted`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Insert the (person, day) entry unless it already exists
    async fn insert_if_absent(&self, person_id: Uuid, day: NaiveDate)
    -> RepositoryResult<LedgerInsert>;

    /// Whether the (person, day) entry exists
    async fn exists(&self, person_id: Uuid, day: NaiveDate) -> RepositoryResult<bool>;

    /// Remove every entry for a person, returning how many were removed
    async fn delete_all(&self, person_id: Uuid) -> RepositoryResult<u64>;

    /// Withdraw a single entry whose message could not be sent
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Entry was removed
    /// * `Ok(false)` - No such entry
    async fn release(&self, person_id: Uuid, day: NaiveDate) -> RepositoryResult<bool>;
}
