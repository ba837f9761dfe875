//! Tax document entity - generated 1099-MISC forms and annual summaries.
//!
//! `document_data` holds a JSON snapshot of everything printed on the
//! document at generation time, so later ledger changes never alter an issued
//! form. At most one document exists per (recipient, year, type).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tax document database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tax_documents")]
pub struct Model {
    /// Unique identifier for the document
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Email of the recipient
    pub recipient_user_id: String,
    /// Calendar year covered
    pub tax_year: i32,
    /// `"1099-MISC"` or `"annual_summary"`
    pub document_type: String,
    /// Earnings reported on the document
    pub total_earnings: Decimal,
    /// Number of ledger rows behind the figure
    pub total_transactions: i32,
    /// `"generated"` or `"sent"`
    pub document_status: String,
    /// Snapshot of the document contents
    pub document_data: Json,
    /// Where the rendered document is stored
    pub document_url: Option<String>,
    /// SHA-256 of the snapshot, hex encoded
    pub document_hash: Option<String>,
    /// Whether the document must also be filed with the IRS
    pub irs_filing_required: bool,
    /// When the document was delivered
    pub sent_date: Option<DateTimeUtc>,
    /// `"email"` or `"mail"`
    pub delivery_method: Option<String>,
    /// `"delivered"` once sent
    pub delivery_status: Option<String>,
    /// When the document was generated
    pub created_at: DateTimeUtc,
    /// When the row last changed
    pub updated_at: DateTimeUtc,
}

/// Documents are keyed by recipient email, not by foreign key
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
