//! Database configuration module.
//!
//! Handles the database connection and table creation using `SeaORM`. Tables are
//! generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. Composite uniqueness rules
//! that an entity attribute cannot express are added as explicit indexes.

use crate::entities::{
    AnnualEarnings, AuditLog, RefundAdjustment, TaxDocument, TransactionRecord, User,
    annual_earnings, tax_document,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/geargrab.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, falling
/// back to a local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if database_url == DEFAULT_DATABASE_URL {
        std::fs::create_dir_all("data")?;
    }
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables and indexes if they do not already exist.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table_for(db, &schema, User).await?;
    create_table_for(db, &schema, TransactionRecord).await?;
    create_table_for(db, &schema, RefundAdjustment).await?;
    create_table_for(db, &schema, AnnualEarnings).await?;
    create_table_for(db, &schema, TaxDocument).await?;
    create_table_for(db, &schema, AuditLog).await?;

    // One running total per user and year
    let earnings_index = Index::create()
        .name("idx_annual_earnings_user_year")
        .table(AnnualEarnings)
        .col(annual_earnings::Column::UserId)
        .col(annual_earnings::Column::TaxYear)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&earnings_index)).await?;

    // One document per recipient, year and document type
    let document_index = Index::create()
        .name("idx_tax_documents_recipient_year_type")
        .table(TaxDocument)
        .col(tax_document::Column::RecipientUserId)
        .col(tax_document::Column::TaxYear)
        .col(tax_document::Column::DocumentType)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&document_index)).await?;

    info!("Database tables ensured");
    Ok(())
}

async fn create_table_for<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}
