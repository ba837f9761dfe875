//! Tax document business logic - 1099-MISC forms and annual summaries.
//!
//! Documents are generated from the ledger, never from the running totals, and
//! are keyed by (recipient, tax year, document type). Generating a 1099 for a
//! user who already has one returns the existing form unchanged; an annual
//! summary is informational and is refreshed in place instead.

use crate::{
    config::{DocumentSettings, PayerInfo},
    core::{
        UserId,
        audit::{AuditEntry, record_audit_event},
        meets_1099_threshold,
        transaction::{
            TransactionSummary, get_transaction_summary, get_transactions_for_user,
            get_transactions_for_year,
        },
        user::{TaxAddress, get_user_by_email, has_tax_info, tax_address},
    },
    entities::{TaxDocument, tax_document, transaction_record, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

/// Delivery status recorded once a document has gone out.
pub const DELIVERY_STATUS_DELIVERED: &str = "delivered";

/// Kinds of tax document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    /// IRS Form 1099-MISC
    Form1099Misc,
    /// Informational yearly earnings statement
    AnnualSummary,
}

impl DocumentType {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Form1099Misc => "1099-MISC",
            Self::AnnualSummary => "annual_summary",
        }
    }
}

/// Lifecycle of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Created, not yet delivered
    Generated,
    /// Delivered to the recipient
    Sent,
}

impl DocumentStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Sent => "sent",
        }
    }
}

/// How a recipient receives documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMethod {
    /// Emailed link
    #[default]
    Email,
    /// Printed and posted
    Mail,
}

impl DeliveryMethod {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Mail => "mail",
        }
    }

    /// Reads a user's stored preference, defaulting to email.
    #[must_use]
    pub fn from_preference(preference: Option<&str>) -> Self {
        match preference {
            Some(p) if p.eq_ignore_ascii_case("mail") => Self::Mail,
            _ => Self::Email,
        }
    }
}

/// Recipient block of a 1099-MISC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientInfo {
    /// Login email
    pub email: String,
    /// Legal name
    pub name: String,
    /// Business name, if any
    pub business_name: Option<String>,
    /// Taxpayer identification number
    pub tin: String,
    /// `"ssn"` or `"ein"`
    pub tin_type: Option<String>,
    /// Mailing address
    pub address: TaxAddress,
}

/// Snapshot stored in `document_data` for a 1099-MISC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form1099Data {
    /// Always `"1099-MISC"`
    pub form_type: String,
    /// Calendar year
    pub tax_year: i32,
    /// Who was paid
    pub recipient: RecipientInfo,
    /// Who paid
    pub payer: PayerInfo,
    /// Box 7 amount
    pub nonemployee_compensation: Decimal,
    /// Number of ledger rows behind the amount
    pub total_transactions: usize,
    /// Human-readable period covered
    pub reporting_period: String,
}

/// One month of a user's earnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyEarnings {
    /// `YYYY-MM`
    pub month: String,
    /// Sum of owner payouts
    pub earnings: Decimal,
    /// Number of ledger rows
    pub transactions: usize,
    /// Sum of platform fees withheld
    pub platform_fees: Decimal,
}

/// Pointer to another document, listed on an annual summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    /// Document id
    pub id: i64,
    /// Document type
    pub document_type: String,
    /// Document status
    pub document_status: String,
    /// When it was generated
    pub created_at: DateTime<Utc>,
}

/// Snapshot stored in `document_data` for an annual summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnualSummaryData {
    /// Calendar year
    pub tax_year: i32,
    /// Recipient legal name
    pub recipient_name: String,
    /// Recipient email
    pub recipient_email: String,
    /// Totals recomputed from the ledger
    pub summary: TransactionSummary,
    /// Month-by-month earnings
    pub monthly_breakdown: Vec<MonthlyEarnings>,
    /// Other documents issued for the year
    pub tax_documents: Vec<DocumentReference>,
}

/// Where a rendered document lives and its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Storage URL
    pub url: String,
    /// Hex SHA-256 of the document data
    pub hash: String,
}

/// Produces the stored artifact for a document row.
pub trait DocumentRenderer {
    /// Renders `document` and reports where it was stored.
    ///
    /// # Errors
    /// Returns [`Error::DocumentRender`] if the document cannot be produced.
    fn render(&self, document: &tax_document::Model) -> Result<RenderedDocument>;
}

/// Renderer that assigns a storage URL under a base prefix.
///
/// No PDF is produced; the URL is where the document service is expected to
/// publish it.
#[derive(Debug, Clone)]
pub struct StoredDocumentRenderer {
    base_url: String,
}

impl StoredDocumentRenderer {
    /// Creates a renderer for the configured storage location.
    #[must_use]
    pub fn new(settings: &DocumentSettings) -> Self {
        Self {
            base_url: settings.storage_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl DocumentRenderer for StoredDocumentRenderer {
    fn render(&self, document: &tax_document::Model) -> Result<RenderedDocument> {
        Ok(RenderedDocument {
            url: format!(
                "{}/{}/{}/{}.pdf",
                self.base_url, document.tax_year, document.document_type, document.id
            ),
            hash: document_hash(&document.document_data),
        })
    }
}

/// Hex-encoded SHA-256 of a document snapshot.
#[must_use]
pub fn document_hash(data: &Json) -> String {
    let digest = Sha256::digest(data.to_string().as_bytes());
    hex::encode(digest)
}

/// A payee whose ledger earnings reach the 1099 threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleUser {
    /// The payee's account
    pub user: user::Model,
    /// Ledger earnings for the year
    pub total_earnings: Decimal,
    /// Number of ledger rows
    pub total_transactions: usize,
}

/// A user whose form could not be generated in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    /// The user
    pub user_id: UserId,
    /// What went wrong
    pub error: String,
}

/// Outcome of generating every 1099 for a year.
#[derive(Debug, Clone, Default)]
pub struct BatchGenerationResult {
    /// Calendar year
    pub tax_year: i32,
    /// Forms generated (or already on file) for eligible users
    pub documents: Vec<tax_document::Model>,
    /// Eligible users without complete tax information
    pub skipped: Vec<UserId>,
    /// Users whose generation failed
    pub failures: Vec<GenerationFailure>,
}

/// Finds the document of a given type for a user and year.
pub async fn find_tax_document<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
    document_type: DocumentType,
) -> Result<Option<tax_document::Model>>
where
    C: ConnectionTrait,
{
    TaxDocument::find()
        .filter(tax_document::Column::RecipientUserId.eq(user.as_str()))
        .filter(tax_document::Column::TaxYear.eq(tax_year))
        .filter(tax_document::Column::DocumentType.eq(document_type.as_str()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a document by id.
pub async fn get_tax_document_by_id(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<tax_document::Model>> {
    TaxDocument::find_by_id(id).one(db).await.map_err(Into::into)
}

/// Retrieves a user's documents, optionally for a single year.
pub async fn get_tax_documents_for_user<C>(
    db: &C,
    user: &UserId,
    tax_year: Option<i32>,
) -> Result<Vec<tax_document::Model>>
where
    C: ConnectionTrait,
{
    let mut query =
        TaxDocument::find().filter(tax_document::Column::RecipientUserId.eq(user.as_str()));
    if let Some(year) = tax_year {
        query = query.filter(tax_document::Column::TaxYear.eq(year));
    }
    query
        .order_by_asc(tax_document::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves every document for a year, optionally of one type.
pub async fn get_tax_documents_for_year(
    db: &DatabaseConnection,
    tax_year: i32,
    document_type: Option<DocumentType>,
) -> Result<Vec<tax_document::Model>> {
    let mut query = TaxDocument::find().filter(tax_document::Column::TaxYear.eq(tax_year));
    if let Some(kind) = document_type {
        query = query.filter(tax_document::Column::DocumentType.eq(kind.as_str()));
    }
    query
        .order_by_asc(tax_document::Column::RecipientUserId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Payees whose ledger earnings for the year reach the 1099 threshold,
/// ordered by email.
///
/// Each eligible payee's account is fetched individually. Payees with no
/// account are logged and left out, since no form can be addressed to them.
#[instrument(skip(db))]
pub async fn get_eligible_users_for_1099(
    db: &DatabaseConnection,
    tax_year: i32,
) -> Result<Vec<EligibleUser>> {
    let rows = get_transactions_for_year(db, tax_year).await?;

    let mut totals: BTreeMap<&str, (Decimal, usize)> = BTreeMap::new();
    for row in &rows {
        let entry = totals
            .entry(row.payee_user_id.as_str())
            .or_insert((Decimal::ZERO, 0));
        entry.0 += row.owner_payout_amount;
        entry.1 += 1;
    }

    let mut eligible = Vec::new();
    for (email, (total_earnings, total_transactions)) in totals {
        if !meets_1099_threshold(total_earnings) {
            continue;
        }
        match get_user_by_email(db, &UserId::from(email)).await? {
            Some(user) => eligible.push(EligibleUser {
                user,
                total_earnings,
                total_transactions,
            }),
            None => warn!("Payee {} earned {} but has no account", email, total_earnings),
        }
    }

    debug!("{} users eligible for 1099 in {}", eligible.len(), tax_year);
    Ok(eligible)
}

/// Generates a user's 1099-MISC for a year.
///
/// Returns `Ok(None)` when the user lacks a TIN or tax address, or when their
/// ledger earnings are below the threshold. If the form already exists it is
/// returned as is.
#[instrument(skip(db, renderer, payer))]
pub async fn generate_1099_for_user<R>(
    db: &DatabaseConnection,
    renderer: &R,
    payer: &PayerInfo,
    user_id: &UserId,
    tax_year: i32,
) -> Result<Option<tax_document::Model>>
where
    R: DocumentRenderer + ?Sized,
{
    let user = get_user_by_email(db, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            email: user_id.to_string(),
        })?;

    let (true, Some(tin), Some(address)) = (
        has_tax_info(&user),
        user.tax_id_number.clone(),
        tax_address(&user),
    ) else {
        info!("Skipping 1099 for {}: tax information incomplete", user_id);
        return Ok(None);
    };

    let summary = get_transaction_summary(db, user_id, tax_year).await?;
    if !summary.requires_1099 {
        debug!(
            "No 1099 for {}: earnings {} below threshold",
            user_id, summary.total_earnings
        );
        return Ok(None);
    }

    if let Some(existing) =
        find_tax_document(db, user_id, tax_year, DocumentType::Form1099Misc).await?
    {
        info!("1099 for {} in {} already generated", user_id, tax_year);
        return Ok(Some(existing));
    }

    let data = Form1099Data {
        form_type: DocumentType::Form1099Misc.as_str().to_string(),
        tax_year,
        recipient: RecipientInfo {
            email: user.email.clone(),
            name: user.full_name.clone(),
            business_name: user.business_name.clone(),
            tin,
            tin_type: user.tax_id_type.clone(),
            address,
        },
        payer: payer.clone(),
        nonemployee_compensation: summary.total_earnings,
        total_transactions: summary.total_transactions,
        reporting_period: format!("January 1 - December 31, {tax_year}"),
    };

    let txn = db.begin().await?;
    let now = Utc::now();
    let created = tax_document::ActiveModel {
        recipient_user_id: Set(user.email.clone()),
        tax_year: Set(tax_year),
        document_type: Set(DocumentType::Form1099Misc.as_str().to_string()),
        total_earnings: Set(summary.total_earnings),
        total_transactions: Set(count_to_i32(summary.total_transactions)),
        document_status: Set(DocumentStatus::Generated.as_str().to_string()),
        document_data: Set(serde_json::to_value(&data)?),
        document_url: Set(None),
        document_hash: Set(None),
        irs_filing_required: Set(true),
        sent_date: Set(None),
        delivery_method: Set(None),
        delivery_status: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let document = attach_rendering(&txn, renderer, created).await?;
    txn.commit().await?;

    info!(
        "Generated 1099-MISC {} for {} ({})",
        document.id, user_id, document.total_earnings
    );
    Ok(Some(document))
}

/// Generates 1099-MISC forms for every eligible user.
///
/// A failure for one user is logged and recorded in the result; it never
/// stops the remaining users from being processed.
#[instrument(skip(db, renderer, payer))]
pub async fn generate_1099_forms_for_year<R>(
    db: &DatabaseConnection,
    renderer: &R,
    payer: &PayerInfo,
    tax_year: i32,
) -> Result<BatchGenerationResult>
where
    R: DocumentRenderer + ?Sized,
{
    let eligible = get_eligible_users_for_1099(db, tax_year).await?;
    let mut result = BatchGenerationResult {
        tax_year,
        ..BatchGenerationResult::default()
    };

    for candidate in eligible {
        let user_id = UserId::new(&candidate.user.email);
        match generate_1099_for_user(db, renderer, payer, &user_id, tax_year).await {
            Ok(Some(document)) => result.documents.push(document),
            Ok(None) => result.skipped.push(user_id),
            Err(e) => {
                error!("Failed to generate 1099 for {}: {}", user_id, e);
                result.failures.push(GenerationFailure {
                    user_id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "1099 batch for {}: {} generated, {} skipped, {} failed",
        tax_year,
        result.documents.len(),
        result.skipped.len(),
        result.failures.len()
    );
    Ok(result)
}

/// Groups ledger rows by `YYYY-MM` of their transaction date, ascending.
#[must_use]
pub fn monthly_breakdown(rows: &[transaction_record::Model]) -> Vec<MonthlyEarnings> {
    let mut months: BTreeMap<String, MonthlyEarnings> = BTreeMap::new();
    for row in rows {
        let month = row.transaction_date.format("%Y-%m").to_string();
        let entry = months.entry(month.clone()).or_insert(MonthlyEarnings {
            month,
            earnings: Decimal::ZERO,
            transactions: 0,
            platform_fees: Decimal::ZERO,
        });
        entry.earnings += row.owner_payout_amount;
        entry.transactions += 1;
        entry.platform_fees += row.platform_fee_amount;
    }
    months.into_values().collect()
}

/// A user's month-by-month earnings for a year.
pub async fn get_monthly_breakdown<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
) -> Result<Vec<MonthlyEarnings>>
where
    C: ConnectionTrait,
{
    let rows = get_transactions_for_user(db, user, tax_year).await?;
    Ok(monthly_breakdown(&rows))
}

/// Generates (or refreshes) a user's informational annual summary.
///
/// A refreshed summary goes back to `generated` so the new version is
/// delivered again. The last delivery (`sent_date`, `delivery_*`) is kept
/// until that happens.
#[instrument(skip(db, renderer))]
pub async fn generate_annual_summary<R>(
    db: &DatabaseConnection,
    renderer: &R,
    user_id: &UserId,
    tax_year: i32,
) -> Result<tax_document::Model>
where
    R: DocumentRenderer + ?Sized,
{
    let user = get_user_by_email(db, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            email: user_id.to_string(),
        })?;

    let txn = db.begin().await?;

    let rows = get_transactions_for_user(&txn, user_id, tax_year).await?;
    let summary = crate::core::transaction::summarize_transactions(user_id, tax_year, &rows);
    let tax_documents = get_tax_documents_for_user(&txn, user_id, Some(tax_year))
        .await?
        .into_iter()
        .filter(|doc| doc.document_type != DocumentType::AnnualSummary.as_str())
        .map(|doc| DocumentReference {
            id: doc.id,
            document_type: doc.document_type,
            document_status: doc.document_status,
            created_at: doc.created_at,
        })
        .collect();

    let data = AnnualSummaryData {
        tax_year,
        recipient_name: user.full_name.clone(),
        recipient_email: user.email.clone(),
        summary: summary.clone(),
        monthly_breakdown: monthly_breakdown(&rows),
        tax_documents,
    };
    let document_data = serde_json::to_value(&data)?;
    let now = Utc::now();

    let saved = match find_tax_document(&txn, user_id, tax_year, DocumentType::AnnualSummary)
        .await?
    {
        Some(existing) => {
            if existing.document_status == DocumentStatus::Sent.as_str() {
                warn!(
                    "Annual summary {} for {} was sent on {:?}; refreshed copy needs resending",
                    existing.id, user_id, existing.sent_date
                );
            }
            let mut active: tax_document::ActiveModel = existing.into();
            active.total_earnings = Set(summary.total_earnings);
            active.total_transactions = Set(count_to_i32(summary.total_transactions));
            active.document_data = Set(document_data);
            active.document_status = Set(DocumentStatus::Generated.as_str().to_string());
            active.updated_at = Set(now);
            active.update(&txn).await?
        }
        None => {
            tax_document::ActiveModel {
                recipient_user_id: Set(user.email.clone()),
                tax_year: Set(tax_year),
                document_type: Set(DocumentType::AnnualSummary.as_str().to_string()),
                total_earnings: Set(summary.total_earnings),
                total_transactions: Set(count_to_i32(summary.total_transactions)),
                document_status: Set(DocumentStatus::Generated.as_str().to_string()),
                document_data: Set(document_data),
                document_url: Set(None),
                document_hash: Set(None),
                irs_filing_required: Set(false),
                sent_date: Set(None),
                delivery_method: Set(None),
                delivery_status: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    let document = attach_rendering(&txn, renderer, saved).await?;
    txn.commit().await?;
    Ok(document)
}

/// Marks a document as delivered to its recipient.
///
/// Returns `Ok(false)`, changing nothing, when the document or its recipient
/// does not exist. The delivery method follows the recipient's preference.
#[instrument(skip(db))]
pub async fn send_tax_document(db: &DatabaseConnection, document_id: i64) -> Result<bool> {
    let Some(document) = get_tax_document_by_id(db, document_id).await? else {
        warn!("Cannot send tax document {}: not found", document_id);
        return Ok(false);
    };
    let recipient = UserId::new(&document.recipient_user_id);
    let Some(user) = get_user_by_email(db, &recipient).await? else {
        warn!(
            "Cannot send tax document {}: recipient {} not found",
            document_id, recipient
        );
        return Ok(false);
    };

    let method = DeliveryMethod::from_preference(user.tax_document_delivery.as_deref());
    let now = Utc::now();

    let txn = db.begin().await?;
    let mut active: tax_document::ActiveModel = document.into();
    active.sent_date = Set(Some(now));
    active.delivery_method = Set(Some(method.as_str().to_string()));
    active.delivery_status = Set(Some(DELIVERY_STATUS_DELIVERED.to_string()));
    active.document_status = Set(DocumentStatus::Sent.as_str().to_string());
    active.updated_at = Set(now);
    active.update(&txn).await?;

    record_audit_event(
        &txn,
        AuditEntry {
            action: "send_tax_document",
            record_type: "tax_document",
            record_id: document_id.to_string(),
            details: format!("delivered to {recipient} by {}", method.as_str()),
            performed_by: crate::core::transaction::SYSTEM_ACTOR,
        },
        now,
    )
    .await?;
    txn.commit().await?;

    info!("Sent tax document {} to {}", document_id, recipient);
    Ok(true)
}

/// Reads the 1099 snapshot stored on a document.
pub fn form_1099_data(document: &tax_document::Model) -> Result<Form1099Data> {
    serde_json::from_value(document.document_data.clone()).map_err(|e| Error::MalformedDocument {
        id: document.id,
        message: e.to_string(),
    })
}

async fn attach_rendering<C, R>(
    db: &C,
    renderer: &R,
    document: tax_document::Model,
) -> Result<tax_document::Model>
where
    C: ConnectionTrait,
    R: DocumentRenderer + ?Sized,
{
    let rendered = renderer.render(&document)?;
    let mut active: tax_document::ActiveModel = document.into();
    active.document_url = Set(Some(rendered.url));
    active.document_hash = Set(Some(rendered.hash));
    active.update(db).await.map_err(Into::into)
}

fn count_to_i32(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::user::{TaxProfile, update_tax_profile};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    fn renderer() -> StoredDocumentRenderer {
        StoredDocumentRenderer::new(&DocumentSettings::default())
    }

    /// Fails for one recipient, renders everyone else normally.
    struct FailingRenderer {
        fail_for: String,
        inner: StoredDocumentRenderer,
    }

    impl DocumentRenderer for FailingRenderer {
        fn render(&self, document: &tax_document::Model) -> Result<RenderedDocument> {
            if document.recipient_user_id == self.fail_for {
                return Err(Error::DocumentRender {
                    message: "storage unavailable".to_string(),
                });
            }
            self.inner.render(document)
        }
    }

    async fn document_count(db: &DatabaseConnection) -> Result<u64> {
        TaxDocument::find().count(db).await.map_err(Into::into)
    }

    #[tokio::test]
    async fn test_generate_1099_for_eligible_user() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        insert_test_ledger_row(&db, "owner@example.com", dec!(400), utc(2024, 2, 1)).await?;
        insert_test_ledger_row(&db, "owner@example.com", dec!(250), utc(2024, 7, 1)).await?;

        let owner = UserId::from("owner@example.com");
        let document =
            generate_1099_for_user(&db, &renderer(), &PayerInfo::default(), &owner, 2024)
                .await?
                .unwrap();

        assert_eq!(document.document_type, "1099-MISC");
        assert_eq!(document.document_status, "generated");
        assert_eq!(document.total_earnings, dec!(650));
        assert_eq!(document.total_transactions, 2);
        assert!(document.irs_filing_required);
        assert_eq!(
            document.document_url.as_deref(),
            Some(
                format!(
                    "https://storage.geargrab.com/tax-documents/2024/1099-MISC/{}.pdf",
                    document.id
                )
                .as_str()
            )
        );
        let hash = document.document_hash.clone().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, document_hash(&document.document_data));

        let data = form_1099_data(&document)?;
        assert_eq!(data.nonemployee_compensation, dec!(650));
        assert_eq!(data.recipient.tin, "123-45-6789");
        assert_eq!(data.recipient.address.city, "Denver");
        assert_eq!(data.payer, PayerInfo::default());
        assert_eq!(data.reporting_period, "January 1 - December 31, 2024");

        Ok(())
    }

    #[tokio::test]
    async fn test_generate_1099_below_threshold() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        insert_test_ledger_row(&db, "owner@example.com", dec!(599.99), utc(2024, 2, 1)).await?;

        let result = generate_1099_for_user(
            &db,
            &renderer(),
            &PayerInfo::default(),
            &UserId::from("owner@example.com"),
            2024,
        )
        .await?;

        assert!(result.is_none());
        assert_eq!(document_count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_1099_requires_tax_info() -> Result<()> {
        let db = setup_test_db().await?;

        // No tax details at all
        create_test_user(&db, "bare@example.com").await?;
        insert_test_ledger_row(&db, "bare@example.com", dec!(5000), utc(2024, 2, 1)).await?;

        // TIN but no address
        create_test_user(&db, "tin-only@example.com").await?;
        update_tax_profile(
            &db,
            &UserId::from("tin-only@example.com"),
            TaxProfile {
                tax_id_number: Some("98-7654321".to_string()),
                ..TaxProfile::default()
            },
        )
        .await?;
        insert_test_ledger_row(&db, "tin-only@example.com", dec!(5000), utc(2024, 2, 1)).await?;

        // Address but no TIN
        create_test_user(&db, "address-only@example.com").await?;
        let mut profile = complete_tax_profile();
        profile.tax_id_number = None;
        update_tax_profile(&db, &UserId::from("address-only@example.com"), profile).await?;
        insert_test_ledger_row(&db, "address-only@example.com", dec!(5000), utc(2024, 2, 1))
            .await?;

        for email in [
            "bare@example.com",
            "tin-only@example.com",
            "address-only@example.com",
        ] {
            let result = generate_1099_for_user(
                &db,
                &renderer(),
                &PayerInfo::default(),
                &UserId::from(email),
                2024,
            )
            .await?;
            assert!(result.is_none(), "{email} should not get a 1099");
        }
        assert_eq!(document_count(&db).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_generate_1099_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        insert_test_ledger_row(&db, "owner@example.com", dec!(900), utc(2024, 2, 1)).await?;
        let owner = UserId::from("owner@example.com");

        let first = generate_1099_for_user(&db, &renderer(), &PayerInfo::default(), &owner, 2024)
            .await?
            .unwrap();
        let second = generate_1099_for_user(&db, &renderer(), &PayerInfo::default(), &owner, 2024)
            .await?
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(document_count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_1099_unknown_user() -> Result<()> {
        let db = setup_test_db().await?;
        let result = generate_1099_for_user(
            &db,
            &renderer(),
            &PayerInfo::default(),
            &UserId::from("ghost@example.com"),
            2024,
        )
        .await;
        assert!(matches!(result, Err(Error::UserNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_eligible_users_for_1099() -> Result<()> {
        let db = setup_test_db().await?;
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            create_test_user(&db, email).await?;
        }
        insert_test_ledger_row(&db, "a@example.com", dec!(700), utc(2024, 1, 10)).await?;
        insert_test_ledger_row(&db, "b@example.com", dec!(300), utc(2024, 2, 10)).await?;
        insert_test_ledger_row(&db, "b@example.com", dec!(400), utc(2024, 3, 10)).await?;
        insert_test_ledger_row(&db, "c@example.com", dec!(500), utc(2024, 4, 10)).await?;
        // Other years do not count
        insert_test_ledger_row(&db, "c@example.com", dec!(500), utc(2023, 4, 10)).await?;

        let eligible = get_eligible_users_for_1099(&db, 2024).await?;
        let emails: Vec<&str> = eligible.iter().map(|e| e.user.email.as_str()).collect();

        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
        assert_eq!(eligible[1].total_earnings, dec!(700));
        assert_eq!(eligible[1].total_transactions, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_monthly_breakdown() -> Result<()> {
        let db = setup_test_db().await?;
        let owner = UserId::from("owner@example.com");
        insert_test_ledger_row(&db, owner.as_str(), dec!(200), utc(2022, 1, 20)).await?;
        insert_test_ledger_row(&db, owner.as_str(), dec!(100), utc(2022, 1, 3)).await?;
        insert_test_ledger_row(&db, owner.as_str(), dec!(300), utc(2022, 2, 14)).await?;

        let months = get_monthly_breakdown(&db, &owner, 2022).await?;

        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2022-01");
        assert_eq!(months[0].earnings, dec!(300));
        assert_eq!(months[0].transactions, 2);
        assert_eq!(months[0].platform_fees, dec!(20));
        assert_eq!(months[1].month, "2022-02");
        assert_eq!(months[1].earnings, dec!(300));
        assert_eq!(months[1].transactions, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_generation_survives_one_failure() -> Result<()> {
        let db = setup_test_db().await?;
        for (day, email) in (1..).zip(["a@example.com", "b@example.com", "c@example.com"]) {
            create_tax_ready_user(&db, email).await?;
            insert_test_ledger_row(&db, email, dec!(1000), utc(2024, 5, day)).await?;
        }
        // Eligible but missing tax info
        create_test_user(&db, "d@example.com").await?;
        insert_test_ledger_row(&db, "d@example.com", dec!(1000), utc(2024, 5, 9)).await?;

        let failing = FailingRenderer {
            fail_for: "b@example.com".to_string(),
            inner: renderer(),
        };
        let result =
            generate_1099_forms_for_year(&db, &failing, &PayerInfo::default(), 2024).await?;

        let generated: Vec<&str> = result
            .documents
            .iter()
            .map(|d| d.recipient_user_id.as_str())
            .collect();
        assert_eq!(generated, vec!["a@example.com", "c@example.com"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].user_id, UserId::from("b@example.com"));
        assert_eq!(result.skipped, vec![UserId::from("d@example.com")]);

        // The failed user's partial document was rolled back
        let b_docs = get_tax_documents_for_user(&db, &UserId::from("b@example.com"), None).await?;
        assert!(b_docs.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_annual_summary() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        let owner = UserId::from("owner@example.com");
        insert_test_ledger_row(&db, owner.as_str(), dec!(500), utc(2024, 1, 5)).await?;
        insert_test_ledger_row(&db, owner.as_str(), dec!(300), utc(2024, 3, 5)).await?;

        let form = generate_1099_for_user(&db, &renderer(), &PayerInfo::default(), &owner, 2024)
            .await?
            .unwrap();
        let summary_doc = generate_annual_summary(&db, &renderer(), &owner, 2024).await?;

        assert_eq!(summary_doc.document_type, "annual_summary");
        assert!(!summary_doc.irs_filing_required);
        assert_eq!(summary_doc.total_earnings, dec!(800));
        assert!(summary_doc.document_url.is_some());

        let data: AnnualSummaryData = serde_json::from_value(summary_doc.document_data.clone())?;
        assert_eq!(data.summary.total_transactions, 2);
        assert!(data.summary.requires_1099);
        assert_eq!(data.monthly_breakdown.len(), 2);
        assert_eq!(data.tax_documents.len(), 1);
        assert_eq!(data.tax_documents[0].id, form.id);

        // Regenerating refreshes the same row
        insert_test_ledger_row(&db, owner.as_str(), dec!(100), utc(2024, 6, 5)).await?;
        let refreshed = generate_annual_summary(&db, &renderer(), &owner, 2024).await?;
        assert_eq!(refreshed.id, summary_doc.id);
        assert_eq!(refreshed.total_earnings, dec!(900));
        assert_ne!(refreshed.document_hash, summary_doc.document_hash);
        assert_eq!(document_count(&db).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_tax_document() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        let owner = UserId::from("owner@example.com");
        update_tax_profile(
            &db,
            &owner,
            TaxProfile {
                tax_document_delivery: Some("mail".to_string()),
                ..TaxProfile::default()
            },
        )
        .await?;
        insert_test_ledger_row(&db, owner.as_str(), dec!(1200), utc(2024, 1, 5)).await?;
        let form = generate_1099_for_user(&db, &renderer(), &PayerInfo::default(), &owner, 2024)
            .await?
            .unwrap();

        assert!(send_tax_document(&db, form.id).await?);

        let sent = get_tax_document_by_id(&db, form.id).await?.unwrap();
        assert_eq!(sent.document_status, "sent");
        assert_eq!(sent.delivery_method.as_deref(), Some("mail"));
        assert_eq!(sent.delivery_status.as_deref(), Some("delivered"));
        assert!(sent.sent_date.is_some());

        let audit = crate::core::audit::get_audit_entries_for_record(
            &db,
            "tax_document",
            &form.id.to_string(),
        )
        .await?;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "send_tax_document");
        Ok(())
    }

    #[tokio::test]
    async fn test_send_tax_document_defaults_to_email() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        let owner = UserId::from("owner@example.com");
        insert_test_ledger_row(&db, owner.as_str(), dec!(100), utc(2024, 1, 5)).await?;
        let summary = generate_annual_summary(&db, &renderer(), &owner, 2024).await?;

        assert!(send_tax_document(&db, summary.id).await?);
        let sent = get_tax_document_by_id(&db, summary.id).await?.unwrap();
        assert_eq!(sent.delivery_method.as_deref(), Some("email"));
        Ok(())
    }

    #[tokio::test]
    async fn test_refreshed_summary_keeps_last_delivery() -> Result<()> {
        let db = setup_test_db().await?;
        create_tax_ready_user(&db, "owner@example.com").await?;
        let owner = UserId::from("owner@example.com");
        insert_test_ledger_row(&db, owner.as_str(), dec!(100), utc(2024, 1, 5)).await?;
        let summary = generate_annual_summary(&db, &renderer(), &owner, 2024).await?;
        assert!(send_tax_document(&db, summary.id).await?);
        let sent = get_tax_document_by_id(&db, summary.id).await?.unwrap();

        insert_test_ledger_row(&db, owner.as_str(), dec!(50), utc(2024, 2, 5)).await?;
        let refreshed = generate_annual_summary(&db, &renderer(), &owner, 2024).await?;

        assert_eq!(refreshed.id, summary.id);
        assert_eq!(refreshed.document_status, "generated");
        assert_eq!(refreshed.total_earnings, dec!(150));
        assert_eq!(refreshed.sent_date, sent.sent_date);
        assert_eq!(refreshed.delivery_method.as_deref(), Some("email"));
        assert_eq!(refreshed.delivery_status.as_deref(), Some("delivered"));
        Ok(())
    }

    #[tokio::test]
    async fn test_mixed_case_email_gets_1099() -> Result<()> {
        let db = setup_test_db().await?;
        create_custom_user(&db, "Owner@Example.com", "llc").await?;
        update_tax_profile(
            &db,
            &UserId::from(" Owner@Example.com "),
            complete_tax_profile(),
        )
        .await?;

        let record =
            record_test_payment(&db, "Owner@Example.com", dec!(1000), utc(2024, 3, 1)).await?;
        assert_eq!(record.payee_user_id, "owner@example.com");
        assert!(record.is_business_transaction);

        let eligible = get_eligible_users_for_1099(&db, 2024).await?;
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].user.email, "owner@example.com");

        let direct = generate_1099_for_user(
            &db,
            &renderer(),
            &PayerInfo::default(),
            &UserId::from("OWNER@example.com"),
            2024,
        )
        .await?
        .unwrap();
        assert_eq!(direct.recipient_user_id, "owner@example.com");

        let batch =
            generate_1099_forms_for_year(&db, &renderer(), &PayerInfo::default(), 2024).await?;
        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.documents[0].id, direct.id);
        assert!(batch.skipped.is_empty());
        assert!(batch.failures.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_send_unknown_document() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(!send_tax_document(&db, 404).await?);
        assert_eq!(document_count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_document_without_recipient() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "owner@example.com").await?;
        let owner = UserId::from("owner@example.com");
        let summary = generate_annual_summary(&db, &renderer(), &owner, 2024).await?;

        // Recipient account removed after generation
        crate::entities::User::delete_many()
            .filter(crate::entities::user::Column::Email.eq("owner@example.com"))
            .exec(&db)
            .await?;

        assert!(!send_tax_document(&db, summary.id).await?);
        let unchanged = get_tax_document_by_id(&db, summary.id).await?.unwrap();
        assert_eq!(unchanged.document_status, "generated");
        assert!(unchanged.sent_date.is_none());
        Ok(())
    }

    #[test]
    fn test_delivery_preference() {
        assert_eq!(DeliveryMethod::from_preference(None), DeliveryMethod::Email);
        assert_eq!(
            DeliveryMethod::from_preference(Some("Mail")),
            DeliveryMethod::Mail
        );
        assert_eq!(
            DeliveryMethod::from_preference(Some("carrier pigeon")),
            DeliveryMethod::Email
        );
    }
}
