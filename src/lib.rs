// Money Sync - Core Library
// Record synthesis and cross-table consistency for Money files

pub mod value;    // Field values and records as read from the store
pub mod error;    // Error taxonomy
pub mod config;   // Sentinel constants per schema profile
pub mod policy;   // Per-table column policy
pub mod store;    // Table Store seam + SQLite backend
pub mod synth;    // Row synthesis from caller intent
pub mod ids;      // Surrogate key allocation
pub mod ledger;   // XACCT balance adjustment
pub mod sync;     // PAY/XPAY and TRN/XACCT orchestration
pub mod report;   // Text and CSV rendering for the CLI

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use value::{FieldValue, Record};
pub use error::{FieldMismatch, SchemaMismatch, StoreError, SyncError};
pub use config::{SentinelConstants, SyncConfig};
pub use policy::{ColumnPolicy, MoneyTable, SchemaPolicy};
pub use store::{ColumnInfo, KeyPredicate, SqliteStore, TableStore};
pub use synth::{Intent, PayeeIntent, RowSynthesizer, TransactionIntent, UnmappedColumn};
pub use ids::{next_id, IdSpace};
pub use ledger::{update_account_balance, BalanceUpdate};
pub use sync::{PayeeInsertion, SyncEngine, TableListing, TransactionSync, VerificationReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
