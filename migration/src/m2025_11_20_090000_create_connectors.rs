//! Migration to create the connectors table.
//!
//! The table holds one row per connector definition. `name` carries a unique
//! constraint so concurrent creates with the same name cannot both commit, and
//! the integer id auto-increments without reuse (AUTOINCREMENT on SQLite).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connectors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connectors::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Connectors::Name)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Connectors::Source).text().not_null())
                    .col(ColumnDef::new(Connectors::Target).text().not_null())
                    .col(
                        ColumnDef::new(Connectors::Configuration)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Connectors::RunStatus)
                            .text()
                            .not_null()
                            .default("not_run_yet"),
                    )
                    .col(
                        ColumnDef::new(Connectors::LastRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connectors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connectors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connectors_run_status")
                    .table(Connectors::Table)
                    .col(Connectors::RunStatus)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Dropping the table also drops idx_connectors_run_status.
        manager
            .drop_table(Table::drop().table(Connectors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Connectors {
    Table,
    Id,
    Name,
    Source,
    Target,
    Configuration,
    RunStatus,
    LastRunAt,
    CreatedAt,
    UpdatedAt,
}
