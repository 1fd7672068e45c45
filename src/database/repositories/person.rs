//! SeaORM-based person repository implementation

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect,
    Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{persons, prelude::Persons};
use crate::errors::RepositoryResult;
use crate::models::{NewPerson, Person, PersonChanges};
use crate::repositories::PersonStore;

/// SeaORM-based person repository
#[derive(Clone)]
pub struct PersonSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl PersonSeaOrmRepository {
    /// Create a new PersonSeaOrmRepository
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Convert SeaORM model to domain model
    fn model_to_domain(model: persons::Model) -> Person {
        Person {
            id: model.id,
            name: model.name,
            email: model.email,
            birthdate: model.birthdate,
            timezone: model.timezone,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[async_trait]
impl PersonStore for PersonSeaOrmRepository {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Person>> {
        let model = Persons::find_by_id(id).one(&*self.connection).await?;
        Ok(model.map(Self::model_to_domain))
    }

    async fn list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<Person>> {
        let models = Persons::find()
            .order_by_asc(persons::Column::CreatedAt)
            .order_by_asc(persons::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&*self.connection)
            .await?;

        Ok(models.into_iter().map(Self::model_to_domain).collect())
    }

    async fn create(&self, person: NewPerson) -> RepositoryResult<Person> {
        let now = chrono::Utc::now();

        let active_model = persons::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(person.name),
            email: Set(person.email),
            birthdate: Set(person.birthdate),
            timezone: Set(person.timezone),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&*self.connection).await?;
        Ok(Self::model_to_domain(model))
    }

    async fn update(&self, id: Uuid, changes: PersonChanges) -> RepositoryResult<Option<Person>> {
        let Some(model) = Persons::find_by_id(id).one(&*self.connection).await? else {
            return Ok(None);
        };

        let mut active_model: persons::ActiveModel = model.into();
        if let Some(name) = changes.name {
            active_model.name = Set(name);
        }
        if let Some(email) = changes.email {
            active_model.email = Set(email);
        }
        if let Some(birthdate) = changes.birthdate {
            active_model.birthdate = Set(birthdate);
        }
        if let Some(timezone) = changes.timezone {
            active_model.timezone = Set(timezone);
        }
        active_model.updated_at = Set(chrono::Utc::now());

        let updated = active_model.update(&*self.connection).await?;
        Ok(Some(Self::model_to_domain(updated)))
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = Persons::delete_by_id(id).exec(&*self.connection).await?;
        Ok(result.rows_affected > 0)
    }

    async fn count(&self) -> RepositoryResult<u64> {
        Ok(Persons::find().count(&*self.connection).await?)
    }
}
