use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_persons_table(manager).await?;
        self.create_delivery_logs_table(manager).await?;

        self.create_indexes(manager).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Persons::Table).to_owned())
            .await?;

        Ok(())
    }
}

impl Migration {
    // Helper functions for database-specific types
    fn create_uuid_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_date_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Sqlite => col.string().not_null(),
            _ => col.date().not_null(),
        };
        col
    }

    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    async fn create_persons_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Persons::Table)
                    .if_not_exists()
                    .col(self.create_uuid_column(manager, Persons::Id).primary_key())
                    .col(ColumnDef::new(Persons::Name).string().not_null())
                    .col(ColumnDef::new(Persons::Email).string().not_null())
                    .col(self.create_date_column(manager, Persons::Birthdate))
                    .col(ColumnDef::new(Persons::Timezone).string().not_null())
                    .col(self.create_timestamp_column(manager, Persons::CreatedAt))
                    .col(self.create_timestamp_column(manager, Persons::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_delivery_logs_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        // The composite key is what makes the ledger claim atomic
        manager
            .create_table(
                Table::create()
                    .table(DeliveryLogs::Table)
                    .if_not_exists()
                    .col(self.create_uuid_column(manager, DeliveryLogs::PersonId))
                    .col(self.create_date_column(manager, DeliveryLogs::DeliveryDate))
                    .col(self.create_timestamp_column(manager, DeliveryLogs::DeliveredAt))
                    .primary_key(
                        Index::create()
                            .col(DeliveryLogs::PersonId)
                            .col(DeliveryLogs::DeliveryDate),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_indexes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        // Reconciliation pages persons in (created_at, id) order
        manager
            .create_index(
                Index::create()
                    .name("idx_persons_created_at_id")
                    .table(Persons::Table)
                    .col(Persons::CreatedAt)
                    .col(Persons::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Persons {
    Table,
    Id,
    Name,
    Email,
    Birthdate,
    Timezone,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DeliveryLogs {
    Table,
    PersonId,
    DeliveryDate,
    DeliveredAt,
}
