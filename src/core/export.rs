//! Bulk exports of ledger and tax-document data.
//!
//! Everything here is read-only: rows are flattened, joined against the user
//! table for display fields and serialized as CSV or pretty JSON.

use crate::{
    core::{
        UserId, meets_1099_threshold,
        tax_document::{
            DocumentType, form_1099_data, get_tax_documents_for_user, get_tax_documents_for_year,
        },
        transaction::get_transactions_for_year,
        user::{get_all_users, get_user_by_email},
    },
    entities::{
        RefundAdjustment, TransactionRecord, refund_adjustment, tax_document, transaction_record,
        user,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Two-space indented JSON
    Json,
}

impl ExportFormat {
    /// MIME type of the encoded content.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }

    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// An encoded export ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    /// Encoded body
    pub content: String,
    /// Suggested file name
    pub filename: String,
    /// MIME type of `content`
    pub mime_type: String,
}

/// Which ledger rows to export.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Restrict to one tax year
    pub tax_year: Option<i32>,
    /// Restrict to one payee
    pub payee: Option<UserId>,
}

/// One ledger row joined with its payee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionExportRow {
    /// Ledger reference, `TXN-...`
    pub transaction_number: String,
    /// When the payment was recorded
    pub transaction_date: DateTime<Utc>,
    /// Tax year the row counts toward
    pub tax_year: i32,
    /// Rental the payment belongs to
    pub rental_id: String,
    /// Renter who paid
    pub payer_user_id: String,
    /// Owner who receives the payout
    pub payee_user_id: String,
    /// Payee legal name, if on file
    pub payee_name: Option<String>,
    /// Payee entity type, if on file
    pub payee_entity_type: Option<String>,
    /// Rental price before fees
    pub base_amount: Decimal,
    /// Platform commission
    pub platform_fee_amount: Decimal,
    /// Processor fee
    pub payment_processing_fee: Decimal,
    /// Sales tax collected
    pub tax_amount: Decimal,
    /// Amount charged to the renter
    pub total_amount: Decimal,
    /// Amount paid out to the owner
    pub owner_payout_amount: Decimal,
    /// Commission kept by the platform
    pub platform_revenue: Decimal,
    /// Flag stored when the row was written
    pub requires_1099: bool,
    /// Payee was a business when the row was written
    pub is_business_transaction: bool,
    /// Processor name
    pub payment_processor: String,
    /// Processor-reported status
    pub payment_status: String,
}

/// One tax document joined with its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxDocumentExportRow {
    /// Document id
    pub id: i64,
    /// Recipient key
    pub recipient_email: String,
    /// Recipient legal name
    pub recipient_name: Option<String>,
    /// Recipient business name
    pub business_name: Option<String>,
    /// Tax year covered
    pub tax_year: i32,
    /// `1099-MISC` or `annual_summary`
    pub document_type: String,
    /// Earnings reported on the document
    pub total_earnings: Decimal,
    /// Ledger rows counted
    pub total_transactions: i32,
    /// Lifecycle status
    pub document_status: String,
    /// Whether the document is filed with the IRS
    pub irs_filing_required: bool,
    /// When it was last delivered
    pub sent_date: Option<DateTime<Utc>>,
    /// `email` or `mail`
    pub delivery_method: Option<String>,
    /// When it was first generated
    pub created_at: DateTime<Utc>,
}

/// One 1099-MISC in the layout used for IRS filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Form1099FilingRow {
    /// Source document id
    pub document_id: i64,
    /// Tax year covered
    pub tax_year: i32,
    /// Platform legal name
    pub payer_name: String,
    /// Platform EIN
    pub payer_ein: String,
    /// Platform address on one line
    pub payer_address: String,
    /// Recipient legal name
    pub recipient_name: String,
    /// Recipient business name, if any
    pub recipient_business_name: Option<String>,
    /// Recipient TIN as stored
    pub recipient_tin: String,
    /// `ssn` or `ein`
    pub recipient_tin_type: Option<String>,
    /// Street line
    pub recipient_street_address: String,
    /// City
    pub recipient_city: String,
    /// State
    pub recipient_state: String,
    /// ZIP code
    pub recipient_zip_code: String,
    /// Country
    pub recipient_country: String,
    /// Box 1 amount
    pub nonemployee_compensation: Decimal,
}

/// A payee's totals in the annual report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEarningsTotal {
    /// Payee
    pub user_id: UserId,
    /// Payee legal name, if on file
    pub name: Option<String>,
    /// Sum of owner payouts
    pub total_earnings: Decimal,
    /// Ledger rows counted
    pub total_transactions: usize,
    /// Earnings reach the 1099 threshold
    pub requires_1099: bool,
}

/// Platform-wide figures for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyVolume {
    /// `YYYY-MM`
    pub month: String,
    /// Sum of amounts charged to renters
    pub volume: Decimal,
    /// Sum of platform revenue
    pub platform_revenue: Decimal,
    /// Ledger rows in the month
    pub transactions: usize,
}

/// Year-end report across the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnualTaxReport {
    /// Tax year covered
    pub tax_year: i32,
    /// Ledger rows in the year
    pub total_transactions: usize,
    /// Sum of amounts charged to renters
    pub total_volume: Decimal,
    /// Sum of owner payouts
    pub total_owner_payouts: Decimal,
    /// Sum of platform revenue
    pub total_platform_revenue: Decimal,
    /// Payees at or over the threshold
    pub users_requiring_1099: usize,
    /// Highest earners first
    pub users: Vec<UserEarningsTotal>,
    /// One entry per month with activity
    pub monthly: Vec<MonthlyVolume>,
}

/// Everything held about one user's taxes.
#[derive(Debug, Clone, Serialize)]
pub struct UserTaxData {
    /// Profile row
    pub user: user::Model,
    /// Ledger rows where the user is payee
    pub transactions: Vec<transaction_record::Model>,
    /// Refund adjustments against those rows
    pub adjustments: Vec<refund_adjustment::Model>,
    /// Documents issued to the user
    pub tax_documents: Vec<tax_document::Model>,
    /// When the bundle was assembled
    pub exported_at: DateTime<Utc>,
}

/// Encodes rows as CSV with a header taken from the row's field names.
///
/// Fields containing a comma or quote are quoted, with embedded quotes
/// doubled. No rows yields an empty string.
pub fn generate_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    if rows.is_empty() {
        return Ok(String::new());
    }

    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    let bytes = wtr.into_inner().map_err(|e| Error::Export {
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| Error::Export {
        message: e.to_string(),
    })
}

/// Encodes data as two-space indented JSON.
pub fn generate_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data).map_err(Into::into)
}

fn encode<T: Serialize>(rows: &[T], format: ExportFormat, stem: &str) -> Result<ExportFile> {
    let content = match format {
        ExportFormat::Csv => generate_csv(rows)?,
        ExportFormat::Json => generate_json(rows)?,
    };
    Ok(ExportFile {
        content,
        filename: format!("{stem}.{}", format.extension()),
        mime_type: format.mime_type().to_string(),
    })
}

async fn users_by_email(db: &DatabaseConnection) -> Result<HashMap<String, user::Model>> {
    Ok(get_all_users(db)
        .await?
        .into_iter()
        .map(|user| (user.email.clone(), user))
        .collect())
}

/// Exports ledger rows matching `filter`, oldest first.
#[instrument(skip(db))]
pub async fn export_transactions(
    db: &DatabaseConnection,
    filter: &TransactionFilter,
    format: ExportFormat,
) -> Result<ExportFile> {
    let mut query = TransactionRecord::find();
    if let Some(year) = filter.tax_year {
        query = query.filter(transaction_record::Column::TaxYear.eq(year));
    }
    if let Some(payee) = &filter.payee {
        query = query.filter(transaction_record::Column::PayeeUserId.eq(payee.as_str()));
    }
    let records = query
        .order_by_asc(transaction_record::Column::TransactionDate)
        .all(db)
        .await?;
    let users = users_by_email(db).await?;

    let rows: Vec<TransactionExportRow> = records
        .into_iter()
        .map(|r| {
            let payee = users.get(&r.payee_user_id);
            TransactionExportRow {
                payee_name: payee.map(|u| u.full_name.clone()),
                payee_entity_type: payee.map(|u| u.entity_type.clone()),
                transaction_number: r.transaction_number,
                transaction_date: r.transaction_date,
                tax_year: r.tax_year,
                rental_id: r.rental_id,
                payer_user_id: r.payer_user_id,
                payee_user_id: r.payee_user_id,
                base_amount: r.base_amount,
                platform_fee_amount: r.platform_fee_amount,
                payment_processing_fee: r.payment_processing_fee,
                tax_amount: r.tax_amount,
                total_amount: r.total_amount,
                owner_payout_amount: r.owner_payout_amount,
                platform_revenue: r.platform_revenue,
                requires_1099: r.requires_1099,
                is_business_transaction: r.is_business_transaction,
                payment_processor: r.payment_processor,
                payment_status: r.payment_status,
            }
        })
        .collect();

    let scope = filter
        .tax_year
        .map_or_else(|| "all".to_string(), |year| year.to_string());
    info!("Exporting {} transaction rows ({})", rows.len(), scope);
    encode(&rows, format, &format!("transactions_{scope}"))
}

/// Exports every tax document for a year.
#[instrument(skip(db))]
pub async fn export_tax_documents(
    db: &DatabaseConnection,
    tax_year: i32,
    format: ExportFormat,
) -> Result<ExportFile> {
    let documents = get_tax_documents_for_year(db, tax_year, None).await?;
    let users = users_by_email(db).await?;

    let rows: Vec<TaxDocumentExportRow> = documents
        .into_iter()
        .map(|d| {
            let recipient = users.get(&d.recipient_user_id);
            TaxDocumentExportRow {
                id: d.id,
                recipient_name: recipient.map(|u| u.full_name.clone()),
                business_name: recipient.and_then(|u| u.business_name.clone()),
                recipient_email: d.recipient_user_id,
                tax_year: d.tax_year,
                document_type: d.document_type,
                total_earnings: d.total_earnings,
                total_transactions: d.total_transactions,
                document_status: d.document_status,
                irs_filing_required: d.irs_filing_required,
                sent_date: d.sent_date,
                delivery_method: d.delivery_method,
                created_at: d.created_at,
            }
        })
        .collect();

    encode(&rows, format, &format!("tax_documents_{tax_year}"))
}

/// Reshapes a year's 1099-MISC documents into filing rows.
///
/// Rows are built from the snapshot taken at generation time, so the filing
/// matches what recipients received.
///
/// # Errors
/// Returns [`Error::MalformedDocument`] if a stored snapshot cannot be read.
#[instrument(skip(db))]
pub async fn export_1099_filing_data(
    db: &DatabaseConnection,
    tax_year: i32,
    format: ExportFormat,
) -> Result<ExportFile> {
    let documents =
        get_tax_documents_for_year(db, tax_year, Some(DocumentType::Form1099Misc)).await?;

    let mut rows = Vec::with_capacity(documents.len());
    for document in &documents {
        let data = form_1099_data(document)?;
        rows.push(Form1099FilingRow {
            document_id: document.id,
            tax_year: data.tax_year,
            payer_name: data.payer.name,
            payer_ein: data.payer.ein,
            payer_address: data.payer.address,
            recipient_name: data.recipient.name,
            recipient_business_name: data.recipient.business_name,
            recipient_tin: data.recipient.tin,
            recipient_tin_type: data.recipient.tin_type,
            recipient_street_address: data.recipient.address.street_address,
            recipient_city: data.recipient.address.city,
            recipient_state: data.recipient.address.state,
            recipient_zip_code: data.recipient.address.zip_code,
            recipient_country: data.recipient.address.country,
            nonemployee_compensation: data.nonemployee_compensation,
        });
    }

    info!("Prepared {} 1099 filing rows for {}", rows.len(), tax_year);
    encode(&rows, format, &format!("1099_filing_{tax_year}"))
}

/// Aggregates the year's ledger into per-user totals and monthly volume.
#[instrument(skip(db))]
pub async fn generate_annual_tax_report(
    db: &DatabaseConnection,
    tax_year: i32,
) -> Result<AnnualTaxReport> {
    let records = get_transactions_for_year(db, tax_year).await?;
    let users = users_by_email(db).await?;

    let mut per_user: HashMap<&str, (Decimal, usize)> = HashMap::new();
    let mut monthly: BTreeMap<String, MonthlyVolume> = BTreeMap::new();
    for r in &records {
        let totals = per_user
            .entry(r.payee_user_id.as_str())
            .or_insert((Decimal::ZERO, 0));
        totals.0 += r.owner_payout_amount;
        totals.1 += 1;

        let month = r.transaction_date.format("%Y-%m").to_string();
        let entry = monthly.entry(month.clone()).or_insert(MonthlyVolume {
            month,
            volume: Decimal::ZERO,
            platform_revenue: Decimal::ZERO,
            transactions: 0,
        });
        entry.volume += r.total_amount;
        entry.platform_revenue += r.platform_revenue;
        entry.transactions += 1;
    }

    let mut totals: Vec<UserEarningsTotal> = per_user
        .into_iter()
        .map(|(email, (total_earnings, total_transactions))| UserEarningsTotal {
            user_id: UserId::from(email),
            name: users.get(email).map(|u| u.full_name.clone()),
            total_earnings,
            total_transactions,
            requires_1099: meets_1099_threshold(total_earnings),
        })
        .collect();
    totals.sort_by(|a, b| {
        b.total_earnings
            .cmp(&a.total_earnings)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let report = AnnualTaxReport {
        tax_year,
        total_transactions: records.len(),
        total_volume: records.iter().map(|r| r.total_amount).sum(),
        total_owner_payouts: records.iter().map(|r| r.owner_payout_amount).sum(),
        total_platform_revenue: records.iter().map(|r| r.platform_revenue).sum(),
        users_requiring_1099: totals.iter().filter(|u| u.requires_1099).count(),
        users: totals,
        monthly: monthly.into_values().collect(),
    };
    debug!(
        "Annual report for {}: {} transactions, {} payees",
        tax_year,
        report.total_transactions,
        report.users.len()
    );
    Ok(report)
}

/// Exports one user's profile, ledger rows, adjustments and documents as JSON.
#[instrument(skip(db))]
pub async fn export_user_tax_data(db: &DatabaseConnection, user_id: &UserId) -> Result<ExportFile> {
    let user = get_user_by_email(db, user_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            email: user_id.to_string(),
        })?;

    let transactions = TransactionRecord::find()
        .filter(transaction_record::Column::PayeeUserId.eq(user_id.as_str()))
        .order_by_asc(transaction_record::Column::TransactionDate)
        .all(db)
        .await?;
    let adjustments = RefundAdjustment::find()
        .filter(refund_adjustment::Column::PayeeUserId.eq(user_id.as_str()))
        .order_by_asc(refund_adjustment::Column::CreatedAt)
        .all(db)
        .await?;
    let tax_documents = get_tax_documents_for_user(db, user_id, None).await?;

    let data = UserTaxData {
        user,
        transactions,
        adjustments,
        tax_documents,
        exported_at: Utc::now(),
    };

    let stem: String = user_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    Ok(ExportFile {
        content: generate_json(&data)?,
        filename: format!("user_tax_data_{stem}.json"),
        mime_type: ExportFormat::Json.mime_type().to_string(),
    })
}

/// Writes an export into `dir`, creating the directory if needed.
pub fn write_export_file(file: &ExportFile, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(&file.filename);
    std::fs::write(&path, file.content.as_bytes())?;
    info!("Wrote {} ({} bytes)", path.display(), file.content.len());
    Ok(path)
}
