// ⚖️ Balance Ledger - keep XACCT's cached balance in step with TRN
//
// Formula: new_balance = coerce(stored_balance) + delta
//
// The stored balance may come back as an exact decimal, a float or a decimal
// string depending on the file. Everything is turned into a Decimal first;
// money is never added in binary floating point.

use crate::error::{Result, SchemaMismatch, SyncError};
use crate::policy::MoneyTable;
use crate::store::{KeyPredicate, TableStore};
use crate::value::FieldValue;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// Balance column in current files
pub const BALANCE_COLUMN: &str = "amtBalanceSLOTH";

/// Balance column in older files
pub const BALANCE_COLUMN_ALIAS: &str = "amtBalance";

// ============================================================================
// PURE ARITHMETIC
// ============================================================================

/// Pick the balance column: canonical name first, then the alias.
pub fn resolve_balance_column<'a, I>(columns: I) -> Option<&'static str>
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<&str> = columns.into_iter().collect();

    [BALANCE_COLUMN, BALANCE_COLUMN_ALIAS]
        .into_iter()
        .find(|candidate| columns.contains(candidate))
}

/// Exact decimal view of a stored balance. A null balance counts as zero.
pub fn coerce_balance(value: &FieldValue) -> Option<Decimal> {
    match value {
        FieldValue::Null => Some(Decimal::ZERO),
        other => other.to_decimal(),
    }
}

/// `current + delta` in fixed point. `None` when `current` is not numeric.
pub fn apply_delta(current: &FieldValue, delta: Decimal) -> Option<Decimal> {
    coerce_balance(current).and_then(|balance| balance.checked_add(delta))
}

// ============================================================================
// STORE UPDATE
// ============================================================================

/// What one balance adjustment did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceUpdate {
    pub account_id: i64,
    pub column: String,
    pub previous: Decimal,
    pub delta: Decimal,
    pub new: Decimal,
}

impl BalanceUpdate {
    pub fn summary(&self) -> String {
        let sign = if self.delta.is_sign_negative() { "" } else { "+" };
        format!(
            "account {}: {} {}{} -> {} ({})",
            self.account_id, self.previous, sign, self.delta, self.new, self.column
        )
    }
}

/// Add `delta` to the cached balance of `account_id` in XACCT.
///
/// Touches exactly one column of exactly one existing record. Never creates
/// an account record. Not atomic against other writers.
pub fn update_account_balance<S: TableStore>(
    store: &mut S,
    account_id: i64,
    delta: Decimal,
) -> Result<BalanceUpdate> {
    let table = MoneyTable::XAcct;
    let key_column = table.key_column();

    let columns = store.columns(table.name())?;
    if columns.is_empty() {
        return Err(SchemaMismatch::TableMissing {
            table: table.name().to_string(),
        }
        .into());
    }

    let names = columns.iter().map(|c| c.name.as_str());
    if !columns.iter().any(|c| c.name == key_column) {
        return Err(SchemaMismatch::KeyColumnMissing {
            table: table.name().to_string(),
            column: key_column.to_string(),
        }
        .into());
    }
    let balance_column = resolve_balance_column(names).ok_or_else(|| SchemaMismatch::BalanceColumnMissing {
        table: table.name().to_string(),
        tried: vec![BALANCE_COLUMN.to_string(), BALANCE_COLUMN_ALIAS.to_string()],
    })?;

    let records = store.scan(table.name())?;
    let matching: Vec<_> = records
        .iter()
        .filter(|r| r.get(key_column).and_then(FieldValue::as_i64) == Some(account_id))
        .collect();

    let record = match matching.as_slice() {
        [] => {
            return Err(SyncError::AccountNotFound {
                table: table.name().to_string(),
                account_id,
            })
        }
        [one] => *one,
        many => {
            return Err(SyncError::AmbiguousKey {
                table: table.name().to_string(),
                column: key_column.to_string(),
                key: account_id,
                count: many.len(),
            })
        }
    };

    let stored = record.get(balance_column).cloned().unwrap_or(FieldValue::Null);
    let previous = coerce_balance(&stored).ok_or_else(|| SyncError::BalanceNotNumeric {
        table: table.name().to_string(),
        column: balance_column.to_string(),
        account_id,
        value: stored.to_string(),
    })?;
    let new = apply_delta(&stored, delta).ok_or_else(|| SyncError::BalanceNotNumeric {
        table: table.name().to_string(),
        column: balance_column.to_string(),
        account_id,
        value: format!("{} (overflow adding {})", stored, delta),
    })?;

    let touched = store.update_field(
        table.name(),
        &KeyPredicate::new(key_column, account_id),
        balance_column,
        &FieldValue::Decimal(new),
    )?;
    if touched == 0 {
        // Row vanished between scan and write
        return Err(SyncError::AccountNotFound {
            table: table.name().to_string(),
            account_id,
        });
    }

    let update = BalanceUpdate {
        account_id,
        column: balance_column.to_string(),
        previous,
        delta,
        new,
    };
    info!("{}", update.summary());
    Ok(update)
}
