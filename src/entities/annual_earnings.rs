//! Annual earnings entity - running payout total per user and tax year.
//!
//! Maintained incrementally alongside ledger writes. A composite unique index
//! on (`user_id`, `tax_year`) is created in `config::database::create_tables`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Annual earnings accumulator database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "annual_earnings")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Email of the payee
    pub user_id: String,
    /// Calendar year
    pub tax_year: i32,
    /// Cumulative owner payout, never below zero
    pub total_payout: Decimal,
    /// Whether `total_payout` has reached the 1099 threshold
    pub requires_1099: bool,
    /// When the running total last changed
    pub updated_at: DateTimeUtc,
}

/// `AnnualEarnings` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
