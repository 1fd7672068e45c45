//! In-memory store implementations
//!
//! Used by tests and by embedders that bring their own persistence. Both
//! stores honour the same contracts as their SeaORM counterparts.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{DeliveryLedger, LedgerInsert, PersonStore};
use crate::errors::RepositoryResult;
use crate::models::{NewPerson, Person, PersonChanges};

/// Person records held in a map
#[derive(Debug, Default)]
pub struct InMemoryPersonStore {
    persons: RwLock<HashMap<Uuid, Person>>,
}

impl InMemoryPersonStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fully formed record, replacing any record with the same ID
    pub async fn insert(&self, person: Person) {
        self.persons.write().await.insert(person.id, person);
    }
}

#[async_trait]
impl PersonStore for InMemoryPersonStore {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Person>> {
        Ok(self.persons.read().await.get(&id).cloned())
    }

    async fn list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<Person>> {
        let persons = self.persons.read().await;
        let mut all: Vec<&Person> = persons.values().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(all.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn create(&self, person: NewPerson) -> RepositoryResult<Person> {
        let now = Utc::now();
        let person = Person {
            id: Uuid::new_v4(),
            name: person.name,
            email: person.email,
            birthdate: person.birthdate,
            timezone: person.timezone,
            created_at: now,
            updated_at: now,
        };

        self.persons.write().await.insert(person.id, person.clone());
        Ok(person)
    }

    async fn update(&self, id: Uuid, changes: PersonChanges) -> RepositoryResult<Option<Person>> {
        let mut persons = self.persons.write().await;
        let Some(existing) = persons.get_mut(&id) else {
            return Ok(None);
        };

        *existing = existing.with_changes(&changes);
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.persons.write().await.remove(&id).is_some())
    }

    async fn count(&self) -> RepositoryResult<u64> {
        Ok(self.persons.read().await.len() as u64)
    }
}

/// Ledger entries held in a set; the set itself enforces uniqueness
#[derive(Debug, Default)]
pub struct InMemoryDeliveryLedger {
    entries: RwLock<HashSet<(Uuid, NaiveDate)>>,
}

impl InMemoryDeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all persons
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries for one person
    pub async fn days_for(&self, person_id: Uuid) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id == person_id)
            .map(|(_, day)| *day)
            .collect();
        days.sort();
        days
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryDeliveryLedger {
    async fn insert_if_absent(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> RepositoryResult<LedgerInsert> {
        if self.entries.write().await.insert((person_id, day)) {
            Ok(LedgerInsert::Inserted)
        } else {
            Ok(LedgerInsert::AlreadyPresent)
        }
    }

    async fn exists(&self, person_id: Uuid, day: NaiveDate) -> RepositoryResult<bool> {
        Ok(self.entries.read().await.contains(&(person_id, day)))
    }

    async fn delete_all(&self, person_id: Uuid) -> RepositoryResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(id, _)| *id != person_id);
        Ok((before - entries.len()) as u64)
    }

    async fn release(&self, person_id: Uuid, day: NaiveDate) -> RepositoryResult<bool> {
        Ok(self.entries.write().await.remove(&(person_id, day)))
    }
}
