//! Migrator registering the document tables and the server-side patch function.
//! The function is applied last since the store's writes depend on it.
pub use sea_orm_migration::prelude::*;

mod m20220101_000001_create_users;
mod m20220101_000002_create_groups;
mod m20220101_000003_create_doc_apply;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20220101_000001_create_users::Migration),
            Box::new(m20220101_000002_create_groups::Migration),
            Box::new(m20220101_000003_create_doc_apply::Migration),
        ]
    }
}
