//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating users and ledger rows with sensible defaults.

use crate::{
    config::FeePolicy,
    core::{
        UserId,
        fees::FeeBreakdown,
        transaction::{self, PaymentDetails, RentalParties},
        user::{self, NewUser, TaxAddress, TaxProfile},
    },
    entities::{transaction_record, user as user_entity},
    errors::Result,
};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Midnight UTC on the given date.
///
/// # Panics
/// Panics on an invalid date; test inputs are literals.
#[allow(clippy::unwrap_used)]
pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Creates an individual user with no tax details.
pub async fn create_test_user(db: &DatabaseConnection, email: &str) -> Result<user_entity::Model> {
    create_custom_user(db, email, "individual").await
}

/// Creates a user with a specific entity type.
pub async fn create_custom_user(
    db: &DatabaseConnection,
    email: &str,
    entity_type: &str,
) -> Result<user_entity::Model> {
    user::create_user(
        db,
        NewUser {
            email: UserId::from(email),
            full_name: "Test Owner".to_string(),
            entity_type: entity_type.to_string(),
        },
    )
    .await
}

/// A tax profile with a TIN and a Denver mailing address.
pub fn complete_tax_profile() -> TaxProfile {
    TaxProfile {
        business_name: None,
        tax_id_number: Some("123-45-6789".to_string()),
        tax_id_type: Some("ssn".to_string()),
        tax_address: Some(TaxAddress {
            street_address: "42 Summit Rd".to_string(),
            city: "Denver".to_string(),
            state: "CO".to_string(),
            zip_code: "80202".to_string(),
            country: "US".to_string(),
        }),
        entity_type: None,
        tax_document_delivery: None,
    }
}

/// Creates a user whose tax details are complete enough for a 1099.
pub async fn create_tax_ready_user(
    db: &DatabaseConnection,
    email: &str,
) -> Result<user_entity::Model> {
    create_test_user(db, email).await?;
    user::update_tax_profile(db, &UserId::from(email), complete_tax_profile()).await
}

/// Fee breakdown as checkout would report it, with no processor fee.
pub fn test_fee_breakdown(base_amount: Decimal) -> FeeBreakdown {
    FeeBreakdown {
        base_amount,
        platform_fee: base_amount * dec!(0.10),
        processing_fee: None,
        tax_amount: None,
        total_amount: base_amount * dec!(1.10),
    }
}

/// A successful card payment.
pub fn test_payment() -> PaymentDetails {
    PaymentDetails {
        processor: "stripe".to_string(),
        processor_transaction_id: "pi_test_123".to_string(),
        method_type: "card".to_string(),
        status: "succeeded".to_string(),
    }
}

/// Rental between the given renter and owner.
pub fn test_rental(payer: &str, payee: &str) -> RentalParties {
    RentalParties {
        rental_id: "rental-1".to_string(),
        payer: UserId::from(payer),
        payee: UserId::from(payee),
    }
}

/// Records a payment through the full ledger path.
pub async fn record_test_payment(
    db: &DatabaseConnection,
    payee: &str,
    base_amount: Decimal,
    at: DateTime<Utc>,
) -> Result<transaction_record::Model> {
    transaction::create_transaction_record_at(
        db,
        &FeePolicy::default(),
        &test_rental("renter@example.com", payee),
        &test_payment(),
        &test_fee_breakdown(base_amount),
        at,
    )
    .await
}

static FIXTURE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Inserts a ledger row with an exact owner payout, bypassing fee allocation
/// and the running total. Use it to shape ledger contents precisely.
pub async fn insert_test_ledger_row(
    db: &DatabaseConnection,
    payee: &str,
    owner_payout: Decimal,
    at: DateTime<Utc>,
) -> Result<transaction_record::Model> {
    let platform_fee = dec!(10);
    let base_amount = owner_payout + platform_fee;
    let sequence = FIXTURE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let row = transaction_record::ActiveModel {
        transaction_number: Set(format!("TXN-{}-FIXTURE-{sequence:06}", at.year())),
        rental_id: Set(format!("rental-{sequence}")),
        payer_user_id: Set("renter@example.com".to_string()),
        payee_user_id: Set(UserId::from(payee).to_string()),
        base_amount: Set(base_amount),
        platform_fee_amount: Set(platform_fee),
        payment_processing_fee: Set(dec!(1)),
        tax_amount: Set(Decimal::ZERO),
        total_amount: Set(base_amount + platform_fee),
        owner_payout_amount: Set(owner_payout),
        platform_revenue: Set(dec!(9)),
        transaction_date: Set(at),
        tax_year: Set(at.year()),
        requires_1099: Set(false),
        is_business_transaction: Set(false),
        payment_processor: Set("stripe".to_string()),
        payment_processor_transaction_id: Set("pi_fixture".to_string()),
        payment_method_type: Set("card".to_string()),
        payment_status: Set("succeeded".to_string()),
        created_at: Set(at),
        created_by: Set(transaction::SYSTEM_ACTOR.to_string()),
        ..Default::default()
    };
    row.insert(db).await.map_err(Into::into)
}
