//! Application settings loaded from `geargrab.toml`.
//!
//! Every section is optional; anything left out falls back to the platform
//! defaults (10% platform fee, 2.9% processing estimate, seven-year retention).

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "geargrab.toml";

/// Configuration structure representing the entire settings file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fee rates applied to every ledger write
    pub fees: FeePolicy,
    /// Payer identity printed on 1099 forms
    pub payer: PayerInfo,
    /// How long each kind of record is kept
    pub retention: RetentionPolicy,
    /// Where rendered documents are stored
    pub documents: DocumentSettings,
}

/// Platform fee policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Share of the base amount the platform keeps
    pub platform_fee_rate: Decimal,
    /// Processing fee estimate used when the processor reports none
    pub default_processing_fee_rate: Decimal,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            platform_fee_rate: dec!(0.10),
            default_processing_fee_rate: dec!(0.029),
        }
    }
}

/// The filer identity that appears in the payer box of a 1099-MISC.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PayerInfo {
    /// Company name
    pub name: String,
    /// Single-line mailing address
    pub address: String,
    /// Employer identification number
    pub ein: String,
}

impl Default for PayerInfo {
    fn default() -> Self {
        Self {
            name: "GearGrab Inc.".to_string(),
            address: "123 Outdoor Way, Denver, CO 80202".to_string(),
            ein: "XX-XXXXXXX".to_string(),
        }
    }
}

/// Retention periods, in years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Ledger rows
    pub transaction_years: u32,
    /// Generated tax documents
    pub tax_document_years: u32,
    /// User tax identification data
    pub user_tax_info_years: u32,
    /// Audit log entries
    pub audit_log_years: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            transaction_years: 7,
            tax_document_years: 7,
            user_tax_info_years: 7,
            audit_log_years: 3,
        }
    }
}

/// Document storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Prefix for stored document URLs
    pub storage_base_url: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            storage_base_url: "https://storage.geargrab.com/tax-documents".to_string(),
        }
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Loading configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents)
}

/// Parses settings from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })?;
    validate(&config)?;
    Ok(config)
}

/// Loads settings from `GEARGRAB_CONFIG` or `./geargrab.toml`, using the
/// built-in defaults when no file exists.
pub fn load_default_config() -> Result<AppConfig> {
    let path =
        std::env::var("GEARGRAB_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        info!("No settings file at {}, using defaults", path);
        Ok(AppConfig::default())
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    let rates = [
        ("platform_fee_rate", config.fees.platform_fee_rate),
        (
            "default_processing_fee_rate",
            config.fees.default_processing_fee_rate,
        ),
    ];
    for (name, rate) in rates {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(Error::Config {
                message: format!("{name} must be between 0 and 1, got {rate}"),
            });
        }
    }
    Ok(())
}
