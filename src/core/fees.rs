//! Fee allocation - splits a rental payment between owner and platform.
//!
//! The platform rate comes from [`FeePolicy`], never from the caller: a
//! checkout that computed its own platform fee gets it recomputed here, and a
//! mismatch is logged so pricing drift is visible.

use crate::{
    config::FeePolicy,
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Amounts reported by checkout for a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Rental price before fees and tax
    pub base_amount: Decimal,
    /// Platform fee as computed by checkout (informational)
    pub platform_fee: Decimal,
    /// Processor fee, when the processor reported one
    pub processing_fee: Option<Decimal>,
    /// Sales tax collected
    pub tax_amount: Option<Decimal>,
    /// Amount charged as computed by checkout (informational)
    pub total_amount: Decimal,
}

/// How a payment is split, as written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAllocation {
    /// Rental price before fees and tax
    pub base_amount: Decimal,
    /// Platform commission
    pub platform_fee: Decimal,
    /// Processor fee absorbed by the platform
    pub processing_fee: Decimal,
    /// Sales tax collected
    pub tax_amount: Decimal,
    /// What the renter pays: base + platform fee + tax
    pub total_amount: Decimal,
    /// What the owner receives: base - platform fee
    pub owner_payout_amount: Decimal,
    /// Platform fee net of processing cost (negative when processing exceeds the fee)
    pub platform_revenue: Decimal,
}

/// Computes the ledger split for a payment.
///
/// # Errors
/// Returns [`Error::InvalidAmount`] if any supplied amount is negative.
pub fn calculate_fee_allocation(
    policy: &FeePolicy,
    breakdown: &FeeBreakdown,
) -> Result<FeeAllocation> {
    let base_amount = breakdown.base_amount;
    let tax_amount = breakdown.tax_amount.unwrap_or(Decimal::ZERO);

    for amount in [Some(base_amount), breakdown.processing_fee, Some(tax_amount)]
        .into_iter()
        .flatten()
    {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidAmount { amount });
        }
    }

    let platform_fee = base_amount * policy.platform_fee_rate;
    let processing_fee = breakdown
        .processing_fee
        .unwrap_or(base_amount * policy.default_processing_fee_rate);
    let total_amount = base_amount + platform_fee + tax_amount;

    if breakdown.platform_fee != platform_fee {
        warn!(
            "Checkout platform fee {} differs from policy fee {}; using policy",
            breakdown.platform_fee, platform_fee
        );
    }
    if breakdown.total_amount != total_amount {
        warn!(
            "Checkout total {} differs from recomputed total {}",
            breakdown.total_amount, total_amount
        );
    }

    Ok(FeeAllocation {
        base_amount,
        platform_fee,
        processing_fee,
        tax_amount,
        total_amount,
        owner_payout_amount: base_amount - platform_fee,
        platform_revenue: platform_fee - processing_fee,
    })
}
