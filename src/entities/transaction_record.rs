//! Transaction record entity - the immutable financial ledger.
//!
//! One row is written per completed rental payment. Rows are never updated;
//! corrections are recorded as `refund_adjustment` rows pointing back here.
//! Money columns hold decimals in a single currency.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger row database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_records")]
pub struct Model {
    /// Unique identifier for the ledger row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-facing number, `TXN-<year>-<millis>-<nnn>`
    #[sea_orm(unique)]
    pub transaction_number: String,
    /// Rental this payment settles
    pub rental_id: String,
    /// Email of the renter who paid
    pub payer_user_id: String,
    /// Email of the gear owner who is paid out
    pub payee_user_id: String,
    /// Rental price before fees and tax
    pub base_amount: Decimal,
    /// Platform commission charged on the base amount
    pub platform_fee_amount: Decimal,
    /// Card/processor fee, absorbed by the platform
    pub payment_processing_fee: Decimal,
    /// Sales tax collected
    pub tax_amount: Decimal,
    /// What the renter was charged
    pub total_amount: Decimal,
    /// What the owner receives
    pub owner_payout_amount: Decimal,
    /// Platform fee net of processing cost
    pub platform_revenue: Decimal,
    /// When the payment completed
    pub transaction_date: DateTimeUtc,
    /// Calendar year the row counts towards
    pub tax_year: i32,
    /// Whether the payee had crossed the 1099 threshold when this row was written
    pub requires_1099: bool,
    /// Whether the payee files as a business entity
    pub is_business_transaction: bool,
    /// Payment processor name (e.g. `"stripe"`)
    pub payment_processor: String,
    /// Processor-side transaction reference
    pub payment_processor_transaction_id: String,
    /// `"card"`, `"bank_transfer"`, ...
    pub payment_method_type: String,
    /// Processor status at the time of recording
    pub payment_status: String,
    /// When the row was written
    pub created_at: DateTimeUtc,
    /// Actor that wrote the row
    pub created_by: String,
}

/// Defines relationships between the ledger and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One ledger row can have many refund adjustments
    #[sea_orm(has_many = "super::refund_adjustment::Entity")]
    RefundAdjustments,
}

impl Related<super::refund_adjustment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RefundAdjustments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
