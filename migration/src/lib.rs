pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20261001_000001_pages_and_users;
mod m20261001_000002_page_views;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_pages_and_users::Migration),
            Box::new(m20261001_000002_page_views::Migration),
        ]
    }
}
