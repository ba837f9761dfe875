//! Transaction ledger business logic.
//!
//! Turns a completed rental payment into an immutable ledger row and keeps the
//! per-user annual earnings accumulator in step with it. The ledger insert and
//! the accumulator update share one database transaction, so a failed second
//! write rolls back the first instead of leaving the running total behind the
//! ledger. Anything that needs an authoritative "has this user crossed the
//! 1099 threshold" answer should still use [`get_transaction_summary`], which
//! recomputes from the ledger rather than trusting stored flags.

use crate::{
    config::FeePolicy,
    core::{
        UserId,
        fees::{FeeBreakdown, calculate_fee_allocation},
        meets_1099_threshold,
        user::{get_user_by_email, is_business_entity},
    },
    entities::{
        AnnualEarnings, RefundAdjustment, TransactionRecord, annual_earnings, refund_adjustment,
        transaction_record,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

/// Actor recorded on rows written by automated payment processing.
pub const SYSTEM_ACTOR: &str = "system";

/// Who is paying whom, and for which rental.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalParties {
    /// Rental being settled
    pub rental_id: String,
    /// Renter
    pub payer: UserId,
    /// Gear owner
    pub payee: UserId,
}

/// Processor-side details of a completed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    /// Processor name (e.g. `"stripe"`)
    pub processor: String,
    /// Processor transaction reference
    pub processor_transaction_id: String,
    /// Payment method (e.g. `"card"`)
    pub method_type: String,
    /// Processor status (e.g. `"succeeded"`)
    pub status: String,
}

/// Outcome of an earnings lookup that must never block a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarningsLookup {
    /// The ledger was read; this is the real figure (possibly zero)
    Confirmed(Decimal),
    /// The ledger could not be read
    Unavailable,
}

impl EarningsLookup {
    /// The confirmed amount, or zero when unknown.
    #[must_use]
    pub fn amount_or_zero(self) -> Decimal {
        match self {
            Self::Confirmed(amount) => amount,
            Self::Unavailable => Decimal::ZERO,
        }
    }

    /// Whether the figure came from a successful ledger read.
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Earnings recomputed from the ledger for one user and year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Payee
    pub user_id: UserId,
    /// Calendar year
    pub tax_year: i32,
    /// Sum of owner payouts
    pub total_earnings: Decimal,
    /// Number of ledger rows
    pub total_transactions: usize,
    /// Sum of platform fees withheld
    pub platform_fees_paid: Decimal,
    /// Whether `total_earnings` reaches the 1099 threshold
    pub requires_1099: bool,
}

/// Kind of correction recorded against a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentType {
    /// The whole rental was refunded
    FullRefund,
    /// Part of the rental was refunded
    PartialRefund,
    /// Bookkeeping correction
    Correction,
}

impl AdjustmentType {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullRefund => "full_refund",
            Self::PartialRefund => "partial_refund",
            Self::Correction => "correction",
        }
    }
}

/// A refund or correction to record.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    /// Ledger row being corrected
    pub original_transaction_id: i64,
    /// Kind of correction
    pub adjustment_type: AdjustmentType,
    /// Amount taken back from the payee's earnings
    pub amount: Decimal,
    /// Free-text reason
    pub reason: String,
    /// Whether the payee's reported earnings change
    pub affects_tax_reporting: bool,
}

/// Result of recomputing a running total from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningsReconciliation {
    /// Payee
    pub user_id: UserId,
    /// Calendar year
    pub tax_year: i32,
    /// Running total before reconciliation
    pub recorded: Decimal,
    /// Ledger payouts net of tax-affecting adjustments
    pub ledger: Decimal,
    /// Whether the running total had to be rewritten
    pub corrected: bool,
}

/// Builds a transaction number, `TXN-<year>-<unix millis>-<nnn>`.
///
/// The random suffix makes collisions unlikely, not impossible; the ledger's
/// unique column rejects the rare duplicate.
#[must_use]
pub fn generate_transaction_number(at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("TXN-{}-{}-{suffix:03}", at.year(), at.timestamp_millis())
}

/// Records a completed rental payment in the ledger.
///
/// The tax year is the current calendar year. See
/// [`create_transaction_record_at`] for the steps involved.
///
/// # Errors
/// Any failure is reported as [`Error::TransactionRecordFailed`].
pub async fn create_transaction_record(
    db: &DatabaseConnection,
    policy: &FeePolicy,
    rental: &RentalParties,
    payment: &PaymentDetails,
    breakdown: &FeeBreakdown,
) -> Result<transaction_record::Model> {
    create_transaction_record_at(db, policy, rental, payment, breakdown, Utc::now()).await
}

/// Records a payment that completed at `at`.
///
/// 1. Splits the payment with [`calculate_fee_allocation`]
/// 2. Freezes `requires_1099` from the payee's earnings so far this year
///    plus this payout
/// 3. Flags business payees
/// 4. Inserts the ledger row and adds the payout to the payee's running total,
///    both in one database transaction
#[instrument(skip(db, policy, payment, breakdown), fields(rental_id = %rental.rental_id))]
pub async fn create_transaction_record_at(
    db: &DatabaseConnection,
    policy: &FeePolicy,
    rental: &RentalParties,
    payment: &PaymentDetails,
    breakdown: &FeeBreakdown,
    at: DateTime<Utc>,
) -> Result<transaction_record::Model> {
    write_transaction_record(db, policy, rental, payment, breakdown, at)
        .await
        .inspect(|record| {
            info!(
                "Recorded {} for payee {} (payout {})",
                record.transaction_number, record.payee_user_id, record.owner_payout_amount
            );
        })
        .inspect_err(|e| error!("Failed to record payment: {}", e))
        .map_err(Error::transaction_record_failed)
}

async fn write_transaction_record(
    db: &DatabaseConnection,
    policy: &FeePolicy,
    rental: &RentalParties,
    payment: &PaymentDetails,
    breakdown: &FeeBreakdown,
    at: DateTime<Utc>,
) -> Result<transaction_record::Model> {
    let allocation = calculate_fee_allocation(policy, breakdown)?;
    let tax_year = at.year();

    let txn = db.begin().await?;

    let requires_1099 =
        check_requires_1099(&txn, &rental.payee, allocation.owner_payout_amount, tax_year).await;
    let is_business = is_business_transaction(&txn, &rental.payee).await;

    let record = transaction_record::ActiveModel {
        transaction_number: Set(generate_transaction_number(at)),
        rental_id: Set(rental.rental_id.clone()),
        payer_user_id: Set(rental.payer.to_string()),
        payee_user_id: Set(rental.payee.to_string()),
        base_amount: Set(allocation.base_amount),
        platform_fee_amount: Set(allocation.platform_fee),
        payment_processing_fee: Set(allocation.processing_fee),
        tax_amount: Set(allocation.tax_amount),
        total_amount: Set(allocation.total_amount),
        owner_payout_amount: Set(allocation.owner_payout_amount),
        platform_revenue: Set(allocation.platform_revenue),
        transaction_date: Set(at),
        tax_year: Set(tax_year),
        requires_1099: Set(requires_1099),
        is_business_transaction: Set(is_business),
        payment_processor: Set(payment.processor.clone()),
        payment_processor_transaction_id: Set(payment.processor_transaction_id.clone()),
        payment_method_type: Set(payment.method_type.clone()),
        payment_status: Set(payment.status.clone()),
        created_at: Set(at),
        created_by: Set(SYSTEM_ACTOR.to_string()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    update_annual_earnings(
        &txn,
        &rental.payee,
        tax_year,
        allocation.owner_payout_amount,
        at,
    )
    .await?;

    txn.commit().await?;
    Ok(record)
}

/// Whether a payout pushes the payee to the 1099 threshold for the year.
///
/// Uses the ledger total recorded before this payout. If the ledger cannot be
/// read the payout is judged on its own and a warning is logged, so the
/// payment itself is never blocked.
pub async fn check_requires_1099<C>(
    db: &C,
    payee: &UserId,
    payout: Decimal,
    tax_year: i32,
) -> bool
where
    C: ConnectionTrait,
{
    let prior = lookup_annual_earnings(db, payee, tax_year).await;
    if !prior.is_confirmed() {
        warn!(
            "1099 check for {} in {} is based on this payout alone",
            payee, tax_year
        );
    }
    meets_1099_threshold(prior.amount_or_zero() + payout)
}

/// Whether the payee files as a business. A missing user, or a failed
/// lookup, counts as an individual.
pub async fn is_business_transaction<C>(db: &C, payee: &UserId) -> bool
where
    C: ConnectionTrait,
{
    match get_user_by_email(db, payee).await {
        Ok(Some(user)) => is_business_entity(&user.entity_type),
        Ok(None) => false,
        Err(e) => {
            warn!("Entity type lookup for {} failed: {}", payee, e);
            false
        }
    }
}

/// Sums the owner payouts recorded in the ledger for a user and year.
pub async fn get_annual_earnings<C>(db: &C, user: &UserId, tax_year: i32) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    let rows = get_transactions_for_user(db, user, tax_year).await?;
    Ok(rows.iter().map(|row| row.owner_payout_amount).sum())
}

/// Like [`get_annual_earnings`], but reports a failed read as
/// [`EarningsLookup::Unavailable`] instead of an error.
pub async fn lookup_annual_earnings<C>(db: &C, user: &UserId, tax_year: i32) -> EarningsLookup
where
    C: ConnectionTrait,
{
    match get_annual_earnings(db, user, tax_year).await {
        Ok(amount) => EarningsLookup::Confirmed(amount),
        Err(e) => {
            warn!("Annual earnings lookup for {} in {} failed: {}", user, tax_year, e);
            EarningsLookup::Unavailable
        }
    }
}

/// Retrieves a user's ledger rows for a year, oldest first.
pub async fn get_transactions_for_user<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
) -> Result<Vec<transaction_record::Model>>
where
    C: ConnectionTrait,
{
    TransactionRecord::find()
        .filter(transaction_record::Column::PayeeUserId.eq(user.as_str()))
        .filter(transaction_record::Column::TaxYear.eq(tax_year))
        .order_by_asc(transaction_record::Column::TransactionDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves every ledger row for a year, oldest first.
pub async fn get_transactions_for_year<C>(
    db: &C,
    tax_year: i32,
) -> Result<Vec<transaction_record::Model>>
where
    C: ConnectionTrait,
{
    TransactionRecord::find()
        .filter(transaction_record::Column::TaxYear.eq(tax_year))
        .order_by_asc(transaction_record::Column::TransactionDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a ledger row by id.
pub async fn get_transaction_record_by_id(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<transaction_record::Model>> {
    TransactionRecord::find_by_id(id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Recomputes a user's earnings for a year from the full ledger slice.
///
/// This is the authoritative 1099 check; a single row's `requires_1099`
/// flag only reflects the total at the time that row was written.
pub async fn get_transaction_summary<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
) -> Result<TransactionSummary>
where
    C: ConnectionTrait,
{
    let rows = get_transactions_for_user(db, user, tax_year).await?;
    Ok(summarize_transactions(user, tax_year, &rows))
}

/// Folds ledger rows into a [`TransactionSummary`].
#[must_use]
pub fn summarize_transactions(
    user: &UserId,
    tax_year: i32,
    rows: &[transaction_record::Model],
) -> TransactionSummary {
    let total_earnings: Decimal = rows.iter().map(|row| row.owner_payout_amount).sum();
    let platform_fees_paid: Decimal = rows.iter().map(|row| row.platform_fee_amount).sum();

    TransactionSummary {
        user_id: user.clone(),
        tax_year,
        total_earnings,
        total_transactions: rows.len(),
        platform_fees_paid,
        requires_1099: meets_1099_threshold(total_earnings),
    }
}

/// Adds `delta` to a user's running total for a year, flooring at zero, and
/// recomputes the stored 1099 flag.
pub async fn update_annual_earnings<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
    delta: Decimal,
    at: DateTime<Utc>,
) -> Result<annual_earnings::Model>
where
    C: ConnectionTrait,
{
    let existing = get_recorded_annual_earnings(db, user, tax_year).await?;

    let updated = if let Some(row) = existing {
        let new_total = (row.total_payout + delta).max(Decimal::ZERO);
        let mut active: annual_earnings::ActiveModel = row.into();
        active.total_payout = Set(new_total);
        active.requires_1099 = Set(meets_1099_threshold(new_total));
        active.updated_at = Set(at);
        active.update(db).await?
    } else {
        let new_total = delta.max(Decimal::ZERO);
        annual_earnings::ActiveModel {
            user_id: Set(user.to_string()),
            tax_year: Set(tax_year),
            total_payout: Set(new_total),
            requires_1099: Set(meets_1099_threshold(new_total)),
            updated_at: Set(at),
            ..Default::default()
        }
        .insert(db)
        .await?
    };

    debug!(
        "Running total for {} in {} is now {}",
        user, tax_year, updated.total_payout
    );
    Ok(updated)
}

/// Subtracts a refunded amount from a user's running total for a year.
pub async fn adjust_annual_earnings<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
    amount: Decimal,
    at: DateTime<Utc>,
) -> Result<annual_earnings::Model>
where
    C: ConnectionTrait,
{
    update_annual_earnings(db, user, tax_year, -amount, at).await
}

/// Reads the stored running total for a user and year.
pub async fn get_recorded_annual_earnings<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
) -> Result<Option<annual_earnings::Model>>
where
    C: ConnectionTrait,
{
    AnnualEarnings::find()
        .filter(annual_earnings::Column::UserId.eq(user.as_str()))
        .filter(annual_earnings::Column::TaxYear.eq(tax_year))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Records a refund or correction against a ledger row.
///
/// All adjustments against one row together may not exceed its owner payout.
/// When the adjustment affects tax reporting, the payee's running total for
/// the original row's tax year is reduced in the same database transaction.
#[instrument(skip(db, request), fields(original = request.original_transaction_id))]
pub async fn create_refund_adjustment(
    db: &DatabaseConnection,
    request: RefundRequest,
    created_by: &str,
) -> Result<refund_adjustment::Model> {
    if request.amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount {
            amount: request.amount,
        });
    }

    let txn = db.begin().await?;

    let original = TransactionRecord::find_by_id(request.original_transaction_id)
        .one(&txn)
        .await?
        .ok_or(Error::TransactionNotFound {
            id: request.original_transaction_id,
        })?;

    let already_refunded: Decimal = RefundAdjustment::find()
        .filter(refund_adjustment::Column::OriginalTransactionId.eq(original.id))
        .all(&txn)
        .await?
        .iter()
        .map(|adjustment| adjustment.adjustment_amount)
        .sum();
    let remaining = original.owner_payout_amount - already_refunded;
    if request.amount > remaining {
        return Err(Error::RefundExceedsPayout {
            transaction_id: original.id,
            requested: request.amount,
            remaining,
        });
    }

    let now = Utc::now();
    let adjustment = refund_adjustment::ActiveModel {
        original_transaction_id: Set(original.id),
        payee_user_id: Set(original.payee_user_id.clone()),
        adjustment_type: Set(request.adjustment_type.as_str().to_string()),
        adjustment_amount: Set(request.amount),
        reason: Set(request.reason),
        affects_tax_reporting: Set(request.affects_tax_reporting),
        tax_year_impact: Set(original.tax_year),
        created_at: Set(now),
        created_by: Set(created_by.to_string()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    if request.affects_tax_reporting {
        adjust_annual_earnings(
            &txn,
            &UserId::new(&original.payee_user_id),
            original.tax_year,
            request.amount,
            now,
        )
        .await?;
    }

    txn.commit().await?;
    info!(
        "Recorded {} of {} against {}",
        adjustment.adjustment_type, adjustment.adjustment_amount, original.transaction_number
    );
    Ok(adjustment)
}

/// Retrieves the adjustments charged against a user's earnings for a year.
pub async fn get_refund_adjustments_for_user<C>(
    db: &C,
    user: &UserId,
    tax_year: i32,
) -> Result<Vec<refund_adjustment::Model>>
where
    C: ConnectionTrait,
{
    RefundAdjustment::find()
        .filter(refund_adjustment::Column::PayeeUserId.eq(user.as_str()))
        .filter(refund_adjustment::Column::TaxYearImpact.eq(tax_year))
        .order_by_asc(refund_adjustment::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Rewrites a user's running total from the ledger when the two disagree.
#[instrument(skip(db))]
pub async fn reconcile_annual_earnings(
    db: &DatabaseConnection,
    user: &UserId,
    tax_year: i32,
) -> Result<EarningsReconciliation> {
    let txn = db.begin().await?;

    let payouts = get_annual_earnings(&txn, user, tax_year).await?;
    let adjustments: Decimal = get_refund_adjustments_for_user(&txn, user, tax_year)
        .await?
        .iter()
        .filter(|adjustment| adjustment.affects_tax_reporting)
        .map(|adjustment| adjustment.adjustment_amount)
        .sum();
    let ledger = (payouts - adjustments).max(Decimal::ZERO);

    let recorded = get_recorded_annual_earnings(&txn, user, tax_year)
        .await?
        .map_or(Decimal::ZERO, |row| row.total_payout);

    let corrected = recorded != ledger;
    if corrected {
        warn!(
            "Running total for {} in {} drifted: recorded {}, ledger {}",
            user, tax_year, recorded, ledger
        );
        update_annual_earnings(&txn, user, tax_year, ledger - recorded, Utc::now()).await?;
    }

    txn.commit().await?;
    Ok(EarningsReconciliation {
        user_id: user.clone(),
        tax_year,
        recorded,
        ledger,
        corrected,
    })
}
