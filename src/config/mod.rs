/// Database configuration and connection management
pub mod database;

/// Fee, payer, retention and document settings from `geargrab.toml`
pub mod settings;

pub use settings::{AppConfig, DocumentSettings, FeePolicy, PayerInfo, RetentionPolicy};
