//! Unified error types for the ledger and tax-document pipeline.

use rust_decimal::Decimal;
use thiserror::Error;

/// Every failure the crate can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or was invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A monetary amount was negative or otherwise unusable
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// No user is registered under this email
    #[error("User not found: {email}")]
    UserNotFound {
        /// Email used for the lookup
        email: String,
    },

    /// An email address that cannot identify a user
    #[error("Invalid email: {email:?}")]
    InvalidEmail {
        /// The rejected email
        email: String,
    },

    /// A user with this email already exists
    #[error("User already exists: {email}")]
    UserAlreadyExists {
        /// Conflicting email
        email: String,
    },

    /// No ledger row with this id
    #[error("Transaction record not found: {id}")]
    TransactionNotFound {
        /// Ledger row id
        id: i64,
    },

    /// Refunds against a ledger row would exceed its owner payout
    #[error(
        "Refund of {requested} against transaction {transaction_id} exceeds the remaining {remaining}"
    )]
    RefundExceedsPayout {
        /// Ledger row id
        transaction_id: i64,
        /// Amount asked for
        requested: Decimal,
        /// Payout not yet refunded
        remaining: Decimal,
    },

    /// No tax document with this id
    #[error("Tax document not found: {id}")]
    TaxDocumentNotFound {
        /// Document id
        id: i64,
    },

    /// Ledger write failed; wraps the underlying cause
    #[error("Failed to create transaction record: {source}")]
    TransactionRecordFailed {
        /// Underlying cause
        source: Box<Error>,
    },

    /// Producing the stored document (URL/hash) failed
    #[error("Document rendering failed: {message}")]
    DocumentRender {
        /// What went wrong
        message: String,
    },

    /// A stored document snapshot could not be interpreted
    #[error("Malformed document data for document {id}: {message}")]
    MalformedDocument {
        /// Document id
        id: i64,
        /// Parse failure
        message: String,
    },

    /// Export generation failed
    #[error("Export error: {message}")]
    Export {
        /// What went wrong
        message: String,
    },

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps any error as a failed ledger write.
    #[must_use]
    pub fn transaction_record_failed(source: Self) -> Self {
        match source {
            already @ Self::TransactionRecordFailed { .. } => already,
            other => Self::TransactionRecordFailed {
                source: Box::new(other),
            },
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
