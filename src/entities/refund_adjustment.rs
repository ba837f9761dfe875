//! Refund adjustment entity - a correction against an existing ledger row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Refund adjustment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refund_adjustments")]
pub struct Model {
    /// Unique identifier for the adjustment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Ledger row being corrected
    pub original_transaction_id: i64,
    /// Payee of the original row (denormalised for per-user queries)
    pub payee_user_id: String,
    /// `"full_refund"`, `"partial_refund"` or `"correction"`
    pub adjustment_type: String,
    /// Positive amount taken back from the payee
    pub adjustment_amount: Decimal,
    /// Free-text reason
    pub reason: String,
    /// Whether the adjustment changes reported earnings
    pub affects_tax_reporting: bool,
    /// Tax year whose earnings are reduced
    pub tax_year_impact: i32,
    /// When the adjustment was recorded
    pub created_at: DateTimeUtc,
    /// Actor that recorded the adjustment
    pub created_by: String,
}

/// Defines relationships between refund adjustments and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each adjustment belongs to one ledger row
    #[sea_orm(
        belongs_to = "super::transaction_record::Entity",
        from = "Column::OriginalTransactionId",
        to = "super::transaction_record::Column::Id"
    )]
    TransactionRecord,
}

impl Related<super::transaction_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
