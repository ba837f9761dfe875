//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod annual_earnings;
pub mod audit_log;
pub mod refund_adjustment;
pub mod tax_document;
pub mod transaction_record;
pub mod user;

// Re-export specific types to avoid conflicts
pub use annual_earnings::{
    Column as AnnualEarningsColumn, Entity as AnnualEarnings, Model as AnnualEarningsModel,
};
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use refund_adjustment::{
    Column as RefundAdjustmentColumn, Entity as RefundAdjustment, Model as RefundAdjustmentModel,
};
pub use tax_document::{
    Column as TaxDocumentColumn, Entity as TaxDocument, Model as TaxDocumentModel,
};
pub use transaction_record::{
    Column as TransactionRecordColumn, Entity as TransactionRecord,
    Model as TransactionRecordModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
