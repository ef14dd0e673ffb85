pub use sea_orm_migration::prelude::*;

mod m20241001_090000_create_schema_users_and_sessions;
mod m20241001_090100_create_message_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241001_090000_create_schema_users_and_sessions::Migration),
            Box::new(m20241001_090100_create_message_tables::Migration),
        ]
    }
}
