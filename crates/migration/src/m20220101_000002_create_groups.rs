//! Create `groups` document table.
//!
//! One JSONB document per group id; `seq` records insertion order.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(text(Groups::Id).primary_key())
                    .col(ColumnDef::new(Groups::Seq).big_integer().not_null().auto_increment())
                    .col(json_binary(Groups::Doc).not_null())
                    .col(timestamp_with_time_zone(Groups::CreatedAt).not_null().default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Groups::UpdatedAt).not_null().default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Groups::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Groups { Table, Id, Seq, Doc, CreatedAt, UpdatedAt }
