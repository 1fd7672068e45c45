//! SeaORM-based delivery ledger
//!
//! The composite primary key on `(person_id, delivery_date)` is the only
//! thing that decides which worker wins a claim. Inserts never read first.

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, Set, SqlErr,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{delivery_logs, prelude::DeliveryLogs};
use crate::errors::RepositoryResult;
use crate::repositories::{DeliveryLedger, LedgerInsert};

/// SeaORM-based delivery ledger repository
#[derive(Clone)]
pub struct DeliveryLedgerSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl DeliveryLedgerSeaOrmRepository {
    /// Create a new DeliveryLedgerSeaOrmRepository
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DeliveryLedger for DeliveryLedgerSeaOrmRepository {
    async fn insert_if_absent(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> RepositoryResult<LedgerInsert> {
        let entry = delivery_logs::ActiveModel {
            person_id: Set(person_id),
            delivery_date: Set(day),
            delivered_at: Set(chrono::Utc::now()),
        };

        let result = DeliveryLogs::insert(entry)
            .on_conflict(
                OnConflict::columns([
                    delivery_logs::Column::PersonId,
                    delivery_logs::Column::DeliveryDate,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await;

        match result {
            Ok(0) | Err(DbErr::RecordNotInserted) => {
                debug!("Ledger entry for {} on {} already present", person_id, day);
                Ok(LedgerInsert::AlreadyPresent)
            }
            Ok(_) => Ok(LedgerInsert::Inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(LedgerInsert::AlreadyPresent)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, person_id: Uuid, day: NaiveDate) -> RepositoryResult<bool> {
        let count = DeliveryLogs::find()
            .filter(delivery_logs::Column::PersonId.eq(person_id))
            .filter(delivery_logs::Column::DeliveryDate.eq(day))
            .count(&*self.connection)
            .await?;
        Ok(count > 0)
    }

    async fn delete_all(&self, person_id: Uuid) -> RepositoryResult<u64> {
        let result = DeliveryLogs::delete_many()
            .filter(delivery_logs::Column::PersonId.eq(person_id))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected)
    }

    async fn release(&self, person_id: Uuid, day: NaiveDate) -> RepositoryResult<bool> {
        let result = DeliveryLogs::delete_by_id((person_id, day))
            .exec(&*self.connection)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
