//! Audit trail writes.

use crate::{
    entities::{AuditLog, audit_log},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::info;

/// An action to record in the audit log.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    /// What was done
    pub action: &'a str,
    /// Kind of record acted on
    pub record_type: &'a str,
    /// Identifier of the record acted on
    pub record_id: String,
    /// Free-form details
    pub details: String,
    /// Actor responsible
    pub performed_by: &'a str,
}

/// Writes one audit log entry.
pub async fn record_audit_event<C>(
    db: &C,
    entry: AuditEntry<'_>,
    at: DateTime<Utc>,
) -> Result<audit_log::Model>
where
    C: ConnectionTrait,
{
    info!(
        action = entry.action,
        record_type = entry.record_type,
        record_id = %entry.record_id,
        performed_by = entry.performed_by,
        "audit"
    );

    audit_log::ActiveModel {
        action: Set(entry.action.to_string()),
        record_type: Set(entry.record_type.to_string()),
        record_id: Set(entry.record_id),
        details: Set(entry.details),
        performed_by: Set(entry.performed_by.to_string()),
        created_at: Set(at),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Retrieves audit entries for one record, oldest first.
pub async fn get_audit_entries_for_record(
    db: &DatabaseConnection,
    record_type: &str,
    record_id: &str,
) -> Result<Vec<audit_log::Model>> {
    AuditLog::find()
        .filter(audit_log::Column::RecordType.eq(record_type))
        .filter(audit_log::Column::RecordId.eq(record_id))
        .order_by_asc(audit_log::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}
