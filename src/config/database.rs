//! Database configuration module for `FormFlow`.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated with `Schema::create_table_from_entity` from the entity
//! models, so the schema always matches the Rust struct definitions without
//! hand-written SQL. Tables are created in dependency order and creation is
//! idempotent, which lets `init-db` and `serve` run against an existing database.

use crate::entities::{
    AppscriptConfig, AuditLog, Directorate, Entitas, Loan, LoanMktCompany, MailSetting,
    MktCompany, ReminderRun, Role, User,
};
use crate::errors::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};
use tracing::{debug, info};

/// Fallback used when `DATABASE_URL` is not set
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/formflow.sqlite?mode=rwc";

/// Establishes a connection to the database at `database_url`.
///
/// `SQLite` and Postgres URLs are both accepted; `SeaORM` picks the driver from the scheme.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options.sqlx_logging(false);
    debug!("Connecting to database");
    Database::connect(options).await.map_err(Into::into)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables that do not exist yet.
///
/// Referenced tables come first so the generated foreign keys resolve on
/// backends that check them at creation time.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Role).await?;
    create_table(db, &schema, Directorate).await?;
    create_table(db, &schema, Entitas).await?;
    create_table(db, &schema, MktCompany).await?;
    create_table(db, &schema, User).await?;
    create_table(db, &schema, Loan).await?;
    create_table(db, &schema, LoanMktCompany).await?;
    create_table(db, &schema, MailSetting).await?;
    create_table(db, &schema, AppscriptConfig).await?;
    create_table(db, &schema, ReminderRun).await?;
    create_table(db, &schema, AuditLog).await?;

    info!("Database tables ensured");
    Ok(())
}
