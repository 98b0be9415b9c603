// 🚨 Error taxonomy for store access, synthesis and the two-table sync

use crate::value::FieldValue;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a Table Store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store unreachable or credential rejected
    #[error("cannot open store '{}': {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    /// Row vector does not line up with the column list it was built for
    #[error("row for table '{table}' has {got} values but {expected} columns")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The store does not look the way the operation needs it to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaMismatch {
    #[error("table '{table}' is absent")]
    TableMissing { table: String },

    #[error("table '{table}' has no balance column (tried {})", tried.join(", "))]
    BalanceColumnMissing { table: String, tried: Vec<String> },

    #[error("table '{table}' has no key column '{column}'")]
    KeyColumnMissing { table: String, column: String },
}

/// One critical column holding something other than its mandated constant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMismatch {
    pub column: String,
    pub expected: FieldValue,
    pub actual: FieldValue,
}

impl std::fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {} (expected {})", self.column, self.actual, self.expected)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaMismatch),

    #[error("account {account_id} not found in {table}")]
    AccountNotFound { table: String, account_id: i64 },

    #[error("{table}.{column} = {key} matches {count} records; refusing to update")]
    AmbiguousKey {
        table: String,
        column: String,
        key: i64,
        count: usize,
    },

    #[error("no record in {table} with {column} = {key}")]
    RecordNotFound {
        table: String,
        column: String,
        key: i64,
    },

    #[error("{table}.{column} already holds the largest possible key; no id left to allocate")]
    KeySpaceExhausted { table: String, column: String },

    #[error("{table}.{column} = {key} is already in use")]
    DuplicateKey {
        table: String,
        column: String,
        key: i64,
    },

    #[error("{table}.{column} holds non-numeric balance '{value}' for account {account_id}")]
    BalanceNotNumeric {
        table: String,
        column: String,
        account_id: i64,
        value: String,
    },

    /// The policy asked for a field this kind of intent does not carry
    #[error("column {table}.{column} needs intent field '{field}', which this intent does not carry")]
    IntentFieldMissing {
        table: String,
        column: String,
        field: &'static str,
    },

    /// A synthesized row would not be recognized by the host application
    #[error("synthesized {table} row violates critical fields: {}", format_mismatches(mismatches))]
    CriticalFieldViolation {
        table: String,
        mismatches: Vec<FieldMismatch>,
    },

    /// Transaction row is in the store but its account balance was not adjusted
    #[error(
        "PARTIAL SYNC: transaction {transaction_id} was written but account {account_id} \
         balance was NOT adjusted ({source}); reconcile account {account_id} manually"
    )]
    PartialSyncFailure {
        transaction_id: i64,
        account_id: i64,
        #[source]
        source: Box<SyncError>,
    },

    /// PAY row written, XPAY row failed, and the PAY row could not be removed again
    #[error(
        "PARTIAL PAYEE: payee {payee_id} exists in PAY without its XPAY balance row ({source})"
    )]
    PartialPayeeFailure {
        payee_id: i64,
        #[source]
        source: Box<SyncError>,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            SyncError::PartialSyncFailure { .. } | SyncError::PartialPayeeFailure { .. }
        )
    }
}

fn format_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SyncError>;
