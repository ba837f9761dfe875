//! Audit log entity - compliance actions taken against stored records.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// What was done (e.g. `"archive"`, `"send_tax_document"`)
    pub action: String,
    /// Kind of record acted on
    pub record_type: String,
    /// Identifier of the record acted on
    pub record_id: String,
    /// Free-form details
    pub details: String,
    /// Actor responsible
    pub performed_by: String,
    /// When the action happened
    pub created_at: DateTimeUtc,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
