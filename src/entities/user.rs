//! User entity - the marketplace account a renter or gear owner signs in with.
//!
//! Only the tax-relevant slice of the account lives here: identity, taxpayer
//! identification, the tax mailing address and delivery preferences. The
//! `email` column is the natural key every ledger row refers to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login email, used as the user key across the ledger
    #[sea_orm(unique)]
    pub email: String,
    /// Legal name printed on tax documents
    pub full_name: String,
    /// Business name for owners renting as a company
    pub business_name: Option<String>,
    /// Taxpayer identification number (SSN or EIN)
    pub tax_id_number: Option<String>,
    /// `"ssn"` or `"ein"`
    pub tax_id_type: Option<String>,
    /// Tax mailing address - street line
    pub tax_street_address: Option<String>,
    /// Tax mailing address - city
    pub tax_city: Option<String>,
    /// Tax mailing address - state
    pub tax_state: Option<String>,
    /// Tax mailing address - ZIP code
    pub tax_zip_code: Option<String>,
    /// Tax mailing address - country
    pub tax_country: Option<String>,
    /// `"individual"`, `"business"`, `"corporation"` or `"llc"`
    pub entity_type: String,
    /// Preferred delivery for tax documents: `"email"` or `"mail"`
    pub tax_document_delivery: Option<String>,
    /// When the account was created
    pub created_at: DateTimeUtc,
    /// When the account (including tax info) was last modified
    pub updated_at: DateTimeUtc,
}

/// Users are referenced by email, not by foreign key
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
