//! Initial migration to create the rolodex database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_contacts(manager).await?;
        self.create_sync_runs(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncRuns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contacts::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_contacts(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Contacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contacts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Contacts::ExternalId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Contacts::FullName).string().not_null())
                    .col(ColumnDef::new(Contacts::Email).string().null())
                    .col(ColumnDef::new(Contacts::Phone).string().null())
                    .col(ColumnDef::new(Contacts::Title).string().null())
                    .col(ColumnDef::new(Contacts::Company).string().null())
                    .col(
                        ColumnDef::new(Contacts::Tags)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(Contacts::RemoteMetadata)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(Contacts::CreatedAtRemote)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Contacts::UpdatedAtRemote)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Contacts::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // The upsert idempotency key
        manager
            .create_index(
                Index::create()
                    .name("idx_contacts_external_id")
                    .table(Contacts::Table)
                    .col(Contacts::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Staleness queries
        manager
            .create_index(
                Index::create()
                    .name("idx_contacts_last_synced")
                    .table(Contacts::Table)
                    .col(Contacts::LastSyncedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_runs(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncRuns::SyncType).string().not_null())
                    .col(
                        ColumnDef::new(SyncRuns::Status)
                            .string()
                            .not_null()
                            .default("running"),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::Phase)
                            .string()
                            .not_null()
                            .default("claiming"),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::TotalExpected)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::FetchedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::CreatedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::UpdatedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::ErrorCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncRuns::LastProcessedId)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncRuns::ErrorMessage).text().null())
                    .to_owned(),
            )
            .await?;

        // Claim and resume lookups filter on (sync_type, status)
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_runs_type_status_started")
                    .table(SyncRuns::Table)
                    .col(SyncRuns::SyncType)
                    .col(SyncRuns::Status)
                    .col(SyncRuns::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Contacts {
    Table,
    Id,
    ExternalId,
    FullName,
    Email,
    Phone,
    Title,
    Company,
    Tags,
    RemoteMetadata,
    CreatedAtRemote,
    UpdatedAtRemote,
    LastSyncedAt,
}

#[derive(DeriveIden)]
enum SyncRuns {
    Table,
    Id,
    SyncType,
    Status,
    Phase,
    StartedAt,
    CompletedAt,
    TotalExpected,
    FetchedCount,
    CreatedCount,
    UpdatedCount,
    ErrorCount,
    LastProcessedId,
    ErrorMessage,
}
