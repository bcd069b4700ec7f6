//! Sea-ORM migrations for tablechat-store database schema

pub use sea_orm_migration::prelude::*;

mod m20260110_000001_create_conversations_table;
mod m20260110_000002_create_conversation_messages_table;
mod m20260301_000001_add_conversation_revision;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260110_000001_create_conversations_table::Migration),
            Box::new(m20260110_000002_create_conversation_messages_table::Migration),
            Box::new(m20260301_000001_add_conversation_revision::Migration),
        ]
    }
}
