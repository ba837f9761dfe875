//! Core business logic - framework-agnostic ledger, tax-document, export and
//! compliance operations. Every function takes the database connection
//! explicitly; nothing here holds global state.

/// Audit trail writes
pub mod audit;
/// Retention scanning, archival and compliance reporting
pub mod compliance;
/// CSV/JSON exports and the annual tax report
pub mod export;
/// Platform fee allocation
pub mod fees;
/// 1099-MISC and annual summary generation and delivery
pub mod tax_document;
/// Ledger writes, annual earnings and refund adjustments
pub mod transaction;
/// User lookups and tax profile maintenance
pub mod user;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Annual nonemployee compensation at which a 1099-MISC is required.
pub const FORM_1099_THRESHOLD: Decimal = dec!(600);

/// Identifies a marketplace user. Users are keyed by their login email,
/// trimmed and lowercased so every table and lookup agrees on the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an email address in its canonical form.
    #[must_use]
    pub fn new(email: impl AsRef<str>) -> Self {
        Self(email.as_ref().trim().to_lowercase())
    }

    /// The underlying email address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for UserId {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

/// Whether an annual earnings figure reaches the 1099 threshold.
#[must_use]
pub fn meets_1099_threshold(earnings: Decimal) -> bool {
    earnings >= FORM_1099_THRESHOLD
}
