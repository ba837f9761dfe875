//! Retention scanning, archival bookkeeping and the yearly compliance report.
//!
//! Nothing in this module deletes or moves data. Expired records are flagged,
//! and archiving a record means writing an audit entry for it.

use crate::{
    config::RetentionPolicy,
    core::{
        UserId,
        audit::{AuditEntry, record_audit_event},
        tax_document::{
            DocumentStatus, DocumentType, get_eligible_users_for_1099, get_tax_documents_for_year,
        },
        user::{has_any_tax_data, has_tax_info},
    },
    entities::{AuditLog, TaxDocument, TransactionRecord, User},
    errors::Result,
};
use chrono::{DateTime, Months, Utc};
use sea_orm::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Kinds of record covered by the retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Ledger rows
    Transaction,
    /// Generated tax documents
    TaxDocument,
    /// Tax identification data on a user account
    UserTaxInfo,
    /// Audit log entries
    AuditLog,
}

impl RecordKind {
    /// Stored representation, used as the audit `record_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::TaxDocument => "tax_document",
            Self::UserTaxInfo => "user_tax_info",
            Self::AuditLog => "audit_log",
        }
    }

    const fn retention_years(self, policy: &RetentionPolicy) -> u32 {
        match self {
            Self::Transaction => policy.transaction_years,
            Self::TaxDocument => policy.tax_document_years,
            Self::UserTaxInfo => policy.user_tax_info_years,
            Self::AuditLog => policy.audit_log_years,
        }
    }

    /// Personal data is reviewed by a person; everything else is archived.
    const fn expiry_action(self) -> RetentionAction {
        match self {
            Self::UserTaxInfo => RetentionAction::Review,
            _ => RetentionAction::Archive,
        }
    }
}

/// What should happen to an expired record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    /// Move to long-term storage
    Archive,
    /// Needs a decision before anything happens
    Review,
}

/// A record past its retention period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionItem {
    /// Kind of record
    pub record_kind: RecordKind,
    /// Record identifier (row id, or email for user tax info)
    pub record_id: String,
    /// Date the retention period is measured from
    pub record_date: DateTime<Utc>,
    /// Recommended action
    pub action: RetentionAction,
    /// Retention period that elapsed
    pub retention_years: u32,
}

/// A record kind that could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    /// Kind of record
    pub record_kind: RecordKind,
    /// What went wrong
    pub error: String,
}

/// Result of a retention scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionScan {
    /// Expired records, grouped by kind in scan order
    pub items: Vec<RetentionItem>,
    /// Kinds whose scan failed
    pub failures: Vec<ScanFailure>,
}

impl RetentionScan {
    /// Number of flagged records of one kind.
    #[must_use]
    pub fn count(&self, kind: RecordKind) -> usize {
        self.items
            .iter()
            .filter(|item| item.record_kind == kind)
            .count()
    }
}

/// Counts from an archive run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    /// Records whose archive entry was written
    pub archived: usize,
    /// Records whose archive entry could not be written
    pub failed: usize,
}

/// Retention counts included in the compliance report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSummary {
    /// Ledger rows past retention
    pub transactions_due: usize,
    /// Tax documents past retention
    pub tax_documents_due: usize,
    /// Tax profiles past retention
    pub user_tax_info_due: usize,
    /// Audit entries past retention
    pub audit_logs_due: usize,
    /// Record kinds that could not be scanned
    pub scan_failures: Vec<ScanFailure>,
}

/// Year-end compliance status.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    /// Tax year covered
    pub tax_year: i32,
    /// When the report was built
    pub generated_at: DateTime<Utc>,
    /// Payees whose ledger earnings reach the threshold
    pub eligible_users: usize,
    /// 1099-MISC forms on file for the year
    pub forms_generated: usize,
    /// Of those, forms already delivered
    pub forms_sent: usize,
    /// Eligible payees with no form on file
    pub missing_forms: Vec<UserId>,
    /// Eligible payees whose TIN or tax address is missing
    pub users_missing_tax_info: Vec<UserId>,
    /// Retention scan as of `generated_at`
    pub retention: RetentionSummary,
}

/// Start of the retention window: records dated before this have expired.
#[must_use]
pub fn retention_cutoff(now: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn expired(
    kind: RecordKind,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    records: impl IntoIterator<Item = (String, DateTime<Utc>)>,
) -> Vec<RetentionItem> {
    let years = kind.retention_years(policy);
    let cutoff = retention_cutoff(now, years);
    records
        .into_iter()
        .filter(|(_, date)| *date < cutoff)
        .map(|(record_id, record_date)| RetentionItem {
            record_kind: kind,
            record_id,
            record_date,
            action: kind.expiry_action(),
            retention_years: years,
        })
        .collect()
}

async fn scan_kind<C>(
    db: &C,
    kind: RecordKind,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<RetentionItem>>
where
    C: ConnectionTrait,
{
    let records: Vec<(String, DateTime<Utc>)> = match kind {
        RecordKind::Transaction => TransactionRecord::find()
            .all(db)
            .await?
            .into_iter()
            .map(|r| (r.id.to_string(), r.created_at))
            .collect(),
        RecordKind::TaxDocument => TaxDocument::find()
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.id.to_string(), d.created_at))
            .collect(),
        RecordKind::UserTaxInfo => User::find()
            .all(db)
            .await?
            .into_iter()
            .filter(has_any_tax_data)
            .map(|u| (u.email, u.updated_at))
            .collect(),
        RecordKind::AuditLog => AuditLog::find()
            .all(db)
            .await?
            .into_iter()
            .map(|a| (a.id.to_string(), a.created_at))
            .collect(),
    };
    Ok(expired(kind, policy, now, records))
}

/// Flags every record older than its retention period as of `now`.
///
/// A kind that fails to scan is logged and reported in
/// [`RetentionScan::failures`]; the other kinds are still scanned.
#[instrument(skip(db, policy))]
pub async fn check_data_retention<C>(
    db: &C,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> RetentionScan
where
    C: ConnectionTrait,
{
    let mut scan = RetentionScan::default();
    for kind in [
        RecordKind::Transaction,
        RecordKind::TaxDocument,
        RecordKind::UserTaxInfo,
        RecordKind::AuditLog,
    ] {
        match scan_kind(db, kind, policy, now).await {
            Ok(items) => scan.items.extend(items),
            Err(e) => {
                warn!("Retention scan of {} failed: {}", kind.as_str(), e);
                scan.failures.push(ScanFailure {
                    record_kind: kind,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Retention scan flagged {} records ({} kinds failed)",
        scan.items.len(),
        scan.failures.len()
    );
    scan
}

/// Writes one audit entry per flagged record.
///
/// Records stay where they are; the audit trail is the archive ledger.
#[instrument(skip(db, items))]
pub async fn archive_records<C>(
    db: &C,
    items: &[RetentionItem],
    performed_by: &str,
) -> ArchiveOutcome
where
    C: ConnectionTrait,
{
    let mut outcome = ArchiveOutcome::default();
    let now = Utc::now();

    for item in items {
        let action = match item.action {
            RetentionAction::Archive => "archive",
            RetentionAction::Review => "flag_for_review",
        };
        let entry = AuditEntry {
            action,
            record_type: item.record_kind.as_str(),
            record_id: item.record_id.clone(),
            details: format!(
                "retention period of {} years elapsed since {}",
                item.retention_years,
                item.record_date.format("%Y-%m-%d")
            ),
            performed_by,
        };
        match record_audit_event(db, entry, now).await {
            Ok(_) => outcome.archived += 1,
            Err(e) => {
                warn!(
                    "Could not archive {} {}: {}",
                    item.record_kind.as_str(),
                    item.record_id,
                    e
                );
                outcome.failed += 1;
            }
        }
    }

    info!(
        "Archived {} records, {} failed",
        outcome.archived, outcome.failed
    );
    outcome
}

/// Builds the compliance report for a tax year.
#[instrument(skip(db, policy))]
pub async fn generate_compliance_report(
    db: &DatabaseConnection,
    policy: &RetentionPolicy,
    tax_year: i32,
    now: DateTime<Utc>,
) -> Result<ComplianceReport> {
    let eligible = get_eligible_users_for_1099(db, tax_year).await?;
    let forms = get_tax_documents_for_year(db, tax_year, Some(DocumentType::Form1099Misc)).await?;

    let with_forms: HashSet<&str> = forms
        .iter()
        .map(|form| form.recipient_user_id.as_str())
        .collect();
    let missing_forms = eligible
        .iter()
        .filter(|e| !with_forms.contains(e.user.email.as_str()))
        .map(|e| UserId::new(&e.user.email))
        .collect();
    let users_missing_tax_info = eligible
        .iter()
        .filter(|e| !has_tax_info(&e.user))
        .map(|e| UserId::new(&e.user.email))
        .collect();

    let scan = check_data_retention(db, policy, now).await;

    Ok(ComplianceReport {
        tax_year,
        generated_at: now,
        eligible_users: eligible.len(),
        forms_generated: forms.len(),
        forms_sent: forms
            .iter()
            .filter(|form| form.document_status == DocumentStatus::Sent.as_str())
            .count(),
        missing_forms,
        users_missing_tax_info,
        retention: RetentionSummary {
            transactions_due: scan.count(RecordKind::Transaction),
            tax_documents_due: scan.count(RecordKind::TaxDocument),
            user_tax_info_due: scan.count(RecordKind::UserTaxInfo),
            audit_logs_due: scan.count(RecordKind::AuditLog),
            scan_failures: scan.failures,
        },
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::{DocumentSettings, PayerInfo};
    use crate::core::audit::get_audit_entries_for_record;
    use crate::core::tax_document::{
        StoredDocumentRenderer, generate_1099_for_user, send_tax_document,
    };
    use crate::test_utils::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn audit_entry(record_id: &str) -> AuditEntry<'static> {
        AuditEntry {
            action: "test",
            record_type: "transaction",
            record_id: record_id.to_string(),
            details: String::new(),
            performed_by: "tester",
        }
    }

    #[test]
    fn test_retention_cutoff() {
        assert_eq!(retention_cutoff(utc(2024, 6, 15), 7), utc(2017, 6, 15));
        assert_eq!(retention_cutoff(utc(2024, 2, 29), 3), utc(2021, 2, 28));
    }

    #[tokio::test]
    async fn test_check_data_retention() -> Result<()> {
        let db = setup_test_db().await?;
        let now = utc(2030, 1, 1);

        let old = insert_test_ledger_row(&db, "owner@example.com", dec!(10), utc(2022, 12, 31))
            .await?;
        insert_test_ledger_row(&db, "owner@example.com", dec!(10), utc(2023, 1, 1)).await?;
        let old_audit = record_audit_event(&db, audit_entry("1"), utc(2026, 12, 1)).await?;
        record_audit_event(&db, audit_entry("2"), utc(2027, 2, 1)).await?;

        let scan = check_data_retention(&db, &RetentionPolicy::default(), now).await;

        assert!(scan.failures.is_empty());
        assert_eq!(scan.count(RecordKind::Transaction), 1);
        assert_eq!(scan.count(RecordKind::AuditLog), 1);
        assert_eq!(scan.count(RecordKind::TaxDocument), 0);
        assert_eq!(scan.count(RecordKind::UserTaxInfo), 0);

        let txn_item = &scan.items[0];
        assert_eq!(txn_item.record_id, old.id.to_string());
        assert_eq!(txn_item.action, RetentionAction::Archive);
        assert_eq!(txn_item.retention_years, 7);

        let audit_item = scan
            .items
            .iter()
            .find(|i| i.record_kind == RecordKind::AuditLog)
            .unwrap();
        assert_eq!(audit_item.record_id, old_audit.id.to_string());
        assert_eq!(audit_item.retention_years, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_user_tax_info_is_flagged_for_review() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        // Accounts without tax data are never flagged
        create_test_user(&db, "renter@example.com").await?;

        let far_future = Utc::now() + chrono::Duration::days(365 * 8);
        let scan = check_data_retention(&db, &RetentionPolicy::default(), far_future).await;

        let reviews: Vec<&RetentionItem> = scan
            .items
            .iter()
            .filter(|i| i.record_kind == RecordKind::UserTaxInfo)
            .collect();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].record_id, "owner@example.com");
        assert_eq!(reviews[0].action, RetentionAction::Review);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_data_retention_collects_failures() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let scan = check_data_retention(&db, &RetentionPolicy::default(), utc(2030, 1, 1)).await;

        assert!(scan.items.is_empty());
        assert_eq!(scan.failures.len(), 4);
        assert_eq!(scan.failures[0].record_kind, RecordKind::Transaction);
    }

    #[tokio::test]
    async fn test_archive_records_writes_audit_entries() -> Result<()> {
        let db = setup_test_db().await?;
        let row = insert_test_ledger_row(&db, "owner@example.com", dec!(10), utc(2015, 3, 1))
            .await?;
        let scan = check_data_retention(&db, &RetentionPolicy::default(), utc(2024, 1, 1)).await;
        assert_eq!(scan.items.len(), 1);

        let outcome = archive_records(&db, &scan.items, "compliance-job").await;
        assert_eq!(outcome, ArchiveOutcome { archived: 1, failed: 0 });

        let entries = get_audit_entries_for_record(&db, "transaction", &row.id.to_string()).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "archive");
        assert_eq!(entries[0].performed_by, "compliance-job");
        assert!(entries[0].details.contains("7 years"));

        // The ledger row itself is untouched
        assert_eq!(TransactionRecord::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_records_counts_failures() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let items = vec![
            RetentionItem {
                record_kind: RecordKind::TaxDocument,
                record_id: "7".to_string(),
                record_date: utc(2010, 1, 1),
                action: RetentionAction::Archive,
                retention_years: 7,
            };
            2
        ];

        let outcome = archive_records(&db, &items, "compliance-job").await;
        assert_eq!(outcome, ArchiveOutcome { archived: 0, failed: 2 });
    }

    #[tokio::test]
    async fn test_generate_compliance_report() -> Result<()> {
        let db = setup_test_db().await?;
        let renderer = StoredDocumentRenderer::new(&DocumentSettings::default());

        // Eligible with a sent form
        create_tax_ready_user(&db, "sent@example.com").await?;
        insert_test_ledger_row(&db, "sent@example.com", dec!(900), utc(2024, 3, 1)).await?;
        let form = generate_1099_for_user(
            &db,
            &renderer,
            &PayerInfo::default(),
            &UserId::from("sent@example.com"),
            2024,
        )
        .await?
        .unwrap();
        send_tax_document(&db, form.id).await?;

        // Eligible with a form not yet sent
        create_tax_ready_user(&db, "pending@example.com").await?;
        insert_test_ledger_row(&db, "pending@example.com", dec!(650), utc(2024, 4, 1)).await?;
        generate_1099_for_user(
            &db,
            &renderer,
            &PayerInfo::default(),
            &UserId::from("pending@example.com"),
            2024,
        )
        .await?;

        // Eligible, no tax info, so no form
        create_test_user(&db, "untaxed@example.com").await?;
        insert_test_ledger_row(&db, "untaxed@example.com", dec!(700), utc(2024, 5, 1)).await?;

        // Below threshold
        create_test_user(&db, "small@example.com").await?;
        insert_test_ledger_row(&db, "small@example.com", dec!(100), utc(2024, 5, 2)).await?;

        let report =
            generate_compliance_report(&db, &RetentionPolicy::default(), 2024, utc(2025, 1, 31))
                .await?;

        assert_eq!(report.eligible_users, 3);
        assert_eq!(report.forms_generated, 2);
        assert_eq!(report.forms_sent, 1);
        assert_eq!(report.missing_forms, vec![UserId::from("untaxed@example.com")]);
        assert_eq!(
            report.users_missing_tax_info,
            vec![UserId::from("untaxed@example.com")]
        );
        assert_eq!(report.retention, RetentionSummary::default());
        Ok(())
    }
}
