// 🔢 ID Allocator - next surrogate key from a snapshot of existing keys
//
// Single-writer only. The read-then-compute step is not guarded: a second
// writer between our scan and our append can hand out the same id.

use crate::policy::MoneyTable;
use crate::value::Record;

/// `max(keys ∪ {0}) + 1`. Empty input yields 1; order does not matter.
/// `None` once the largest key is `i64::MAX`.
pub fn next_id<I>(existing_keys: I) -> Option<i64>
where
    I: IntoIterator<Item = i64>,
{
    existing_keys.into_iter().fold(0, i64::max).checked_add(1)
}

/// Which key space to allocate in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpace {
    Transaction,
    Payee,
}

impl IdSpace {
    pub fn table(&self) -> MoneyTable {
        match self {
            IdSpace::Transaction => MoneyTable::Trn,
            IdSpace::Payee => MoneyTable::Pay,
        }
    }
}

/// Integer keys of a scanned table; null or non-integer cells are skipped
pub fn keys_in<'a>(records: &'a [Record], key_column: &'a str) -> impl Iterator<Item = i64> + 'a {
    records
        .iter()
        .filter_map(move |record| record.get(key_column).and_then(|v| v.as_i64()))
}
