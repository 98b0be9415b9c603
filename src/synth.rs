// 🧬 Row Synthesizer - caller intent in, complete row out
//
// Binds the policy to whatever columns the open file reports, by name. The
// output vector always lines up with the live column list, whatever its
// length or order.

use crate::error::{FieldMismatch, Result, SyncError};
use crate::policy::{null_date, ColumnPolicy, Generator, IntentField, MoneyTable, SchemaPolicy};
use crate::value::FieldValue;
use chrono::{Local, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

// ============================================================================
// INTENTS
// ============================================================================

/// Something the caller wants written; supplies the caller-owned fields.
pub trait Intent {
    /// `None` when this kind of intent does not carry `field` at all.
    /// An optional field that is merely absent comes back as `Some(Null)`.
    fn supply(&self, field: IntentField) -> Option<FieldValue>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeIntent {
    pub payee_id: i64,
    pub display_name: String,
}

impl Intent for PayeeIntent {
    fn supply(&self, field: IntentField) -> Option<FieldValue> {
        match field {
            IntentField::PayeeId => Some(FieldValue::Int(self.payee_id)),
            IntentField::PayeeName => Some(FieldValue::Text(self.display_name.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub transaction_id: i64,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub payee_id: i64,
    /// Signed; negative is money leaving the account
    pub amount: Decimal,
    pub memo: String,
    /// Check number or other reference (`szId`)
    pub reference_number: String,
}

impl Intent for TransactionIntent {
    fn supply(&self, field: IntentField) -> Option<FieldValue> {
        match field {
            IntentField::TransactionId => Some(FieldValue::Int(self.transaction_id)),
            IntentField::AccountId => Some(FieldValue::Int(self.account_id)),
            IntentField::CategoryId => Some(self.category_id.into()),
            IntentField::PayeeId => Some(FieldValue::Int(self.payee_id)),
            IntentField::Amount => Some(FieldValue::Decimal(self.amount)),
            IntentField::Memo => Some(FieldValue::Text(self.memo.clone())),
            IntentField::ReferenceNumber => Some(FieldValue::Text(self.reference_number.clone())),
            IntentField::PayeeName => None,
        }
    }
}

// ============================================================================
// SYNTHESIZED ROW
// ============================================================================

/// A live column the policy has no rule for. Written as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedColumn {
    pub table: String,
    pub column: String,
}

impl fmt::Display for UnmappedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown column {}.{} left null", self.table, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct SynthesizedRow {
    pub table: MoneyTable,
    pub columns: Vec<String>,
    pub values: Vec<FieldValue>,
    pub warnings: Vec<UnmappedColumn>,
}

impl SynthesizedRow {
    pub fn value(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }
}

// ============================================================================
// SYNTHESIZER
// ============================================================================

pub struct RowSynthesizer<'p> {
    policy: &'p SchemaPolicy,
}

impl<'p> RowSynthesizer<'p> {
    pub fn new(policy: &'p SchemaPolicy) -> Self {
        RowSynthesizer { policy }
    }

    /// Build a full row for `table` aligned to `live_columns`.
    ///
    /// Unknown columns become null and are reported in `warnings`. A row that
    /// would carry a wrong critical value is refused before anything is written.
    pub fn synthesize<I: Intent + ?Sized>(
        &self,
        table: MoneyTable,
        live_columns: &[String],
        intent: &I,
    ) -> Result<SynthesizedRow> {
        let mut values = Vec::with_capacity(live_columns.len());
        let mut warnings = Vec::new();

        for column in live_columns {
            let value = match self.policy.policy_for(table, column) {
                ColumnPolicy::Constant(value) => value,
                ColumnPolicy::Computed(generator) => generate(generator),
                ColumnPolicy::CallerSupplied(field) => {
                    intent
                        .supply(field)
                        .ok_or_else(|| SyncError::IntentFieldMissing {
                            table: table.name().to_string(),
                            column: column.clone(),
                            field: field.name(),
                        })?
                }
                ColumnPolicy::NullSentinel => FieldValue::DateTime(null_date()),
                ColumnPolicy::Unmapped => {
                    let unmapped = UnmappedColumn {
                        table: table.name().to_string(),
                        column: column.clone(),
                    };
                    warn!("{}", unmapped);
                    warnings.push(unmapped);
                    FieldValue::Null
                }
            };
            debug!(table = table.name(), column = column.as_str(), value = %value, "bound column");
            values.push(value);
        }

        let row = SynthesizedRow {
            table,
            columns: live_columns.to_vec(),
            values,
            warnings,
        };

        let mismatches = critical_mismatches(self.policy, table, |column| row.value(column));
        if !mismatches.is_empty() {
            return Err(SyncError::CriticalFieldViolation {
                table: table.name().to_string(),
                mismatches,
            });
        }

        Ok(row)
    }
}

/// Critical columns present in a row whose value is not the mandated one.
/// Columns the row does not have are skipped.
pub fn critical_mismatches<'a, F>(policy: &SchemaPolicy, table: MoneyTable, lookup: F) -> Vec<FieldMismatch>
where
    F: Fn(&str) -> Option<&'a FieldValue>,
{
    policy
        .critical_fields(table)
        .into_iter()
        .filter_map(|(column, expected)| {
            let actual = lookup(column)?;
            if expected.loosely_equals(actual) {
                None
            } else {
                Some(FieldMismatch {
                    column: column.to_string(),
                    expected,
                    actual: actual.clone(),
                })
            }
        })
        .collect()
}

fn generate(generator: Generator) -> FieldValue {
    match generator {
        Generator::CurrentInstant => FieldValue::DateTime(now_to_second()),
        Generator::FreshGuid => FieldValue::Text(fresh_guid()),
        Generator::ZeroAmount { scale } => FieldValue::Decimal(Decimal::new(0, scale)),
    }
}

/// Local wall clock, truncated to what the store keeps
fn now_to_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `{8-4-4-4-12}` uppercase hex, the GUID form the host application writes
pub fn fresh_guid() -> String {
    format!("{{{}}}", uuid::Uuid::new_v4().to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SentinelConstants;
    use std::str::FromStr;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn create_test_transaction() -> TransactionIntent {
        TransactionIntent {
            transaction_id: 500,
            account_id: 2,
            category_id: None,
            payee_id: 999,
            amount: Decimal::from_str("-50.00").unwrap(),
            memo: "Grocery shopping".to_string(),
            reference_number: String::new(),
        }
    }

    #[test]
    fn test_full_trn_row_sets_every_critical_field() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let live = columns(&policy.documented_columns(MoneyTable::Trn));

        let row = synth.synthesize(MoneyTable::Trn, &live, &create_test_transaction()).unwrap();

        assert_eq!(row.values.len(), live.len());
        assert!(row.warnings.is_empty());
        assert_eq!(row.value("frq"), Some(&FieldValue::Int(-1)));
        assert_eq!(row.value("grftt"), Some(&FieldValue::Int(0)));
        assert_eq!(row.value("lHcrncUser"), Some(&FieldValue::Int(45)));
        assert_eq!(row.value("fUpdated"), Some(&FieldValue::Bool(true)));
        assert_eq!(row.value("iinst"), Some(&FieldValue::Int(-1)));
    }

    #[test]
    fn test_length_and_critical_fields_hold_for_any_column_order() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let documented = columns(&policy.documented_columns(MoneyTable::Trn));
        let intent = create_test_transaction();

        // rotations, reversal, strided subsets and extra unknown columns
        let mut layouts: Vec<Vec<String>> = Vec::new();
        for shift in [0, 7, 23, 60] {
            let mut rotated = documented.clone();
            rotated.rotate_left(shift);
            layouts.push(rotated);
        }
        layouts.push(documented.iter().rev().cloned().collect());
        for stride in [2, 3, 5] {
            layouts.push(documented.iter().step_by(stride).cloned().collect());
        }
        let mut extended = documented.clone();
        extended.insert(10, "lHnewCol".to_string());
        extended.push("szFutureField".to_string());
        layouts.push(extended);
        layouts.push(Vec::new());

        for live in layouts {
            let row = synth.synthesize(MoneyTable::Trn, &live, &intent).unwrap();
            assert_eq!(row.values.len(), live.len());

            for (column, required) in policy.critical_fields(MoneyTable::Trn) {
                if let Some(value) = row.value(column) {
                    assert_eq!(value, &required, "{} wrong", column);
                }
            }
        }
    }

    #[test]
    fn test_unmapped_column_is_null_with_warning() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let live = columns(&["htrn", "szMystery", "frq", "amt"]);

        let row = synth.synthesize(MoneyTable::Trn, &live, &create_test_transaction()).unwrap();

        assert_eq!(row.values.len(), 4);
        assert_eq!(row.value("szMystery"), Some(&FieldValue::Null));
        assert_eq!(row.value("htrn"), Some(&FieldValue::Int(500)));
        assert_eq!(row.value("frq"), Some(&FieldValue::Int(-1)));
        assert_eq!(row.warnings.len(), 1);
        assert_eq!(row.warnings[0].column, "szMystery");
        assert_eq!(row.warnings[0].table, "TRN");
    }

    #[test]
    fn test_caller_fields_and_generators() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let live = columns(&["amt", "amtUser", "amtVat", "hcat", "mMemo", "sguid", "dtPost", "dt", "lHpay"]);

        let row = synth.synthesize(MoneyTable::Trn, &live, &create_test_transaction()).unwrap();

        let amount = Decimal::from_str("-50.00").unwrap();
        assert_eq!(row.value("amt"), Some(&FieldValue::Decimal(amount)));
        assert_eq!(row.value("amtUser"), Some(&FieldValue::Decimal(amount)));
        assert_eq!(row.value("hcat"), Some(&FieldValue::Null));
        assert_eq!(row.value("lHpay"), Some(&FieldValue::Int(999)));
        assert_eq!(row.value("mMemo"), Some(&FieldValue::Text("Grocery shopping".into())));
        assert_eq!(row.value("dtPost"), Some(&FieldValue::DateTime(null_date())));
        assert!(matches!(row.value("dt"), Some(FieldValue::DateTime(dt)) if *dt != null_date()));

        match row.value("amtVat") {
            Some(FieldValue::Decimal(d)) => {
                assert!(d.is_zero());
                assert_eq!(d.scale(), 4);
                assert_eq!(d.to_string(), "0.0000");
            }
            other => panic!("amtVat = {:?}", other),
        }

        match row.value("sguid") {
            Some(FieldValue::Text(guid)) => {
                assert_eq!(guid.len(), 38);
                assert!(guid.starts_with('{') && guid.ends_with('}'));
                assert_eq!(guid, &guid.to_uppercase());
            }
            other => panic!("sguid = {:?}", other),
        }
    }

    #[test]
    fn test_category_passes_through_when_present() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let mut intent = create_test_transaction();
        intent.category_id = Some(131);

        let row = synth.synthesize(MoneyTable::Trn, &columns(&["hcat"]), &intent).unwrap();
        assert_eq!(row.value("hcat"), Some(&FieldValue::Int(131)));
    }

    #[test]
    fn test_payee_rows() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let intent = PayeeIntent {
            payee_id: 999,
            display_name: "Test Payee".to_string(),
        };

        let pay = synth
            .synthesize(MoneyTable::Pay, &columns(&["hpay", "szFull", "fUpdated", "fLocal", "hcat"]), &intent)
            .unwrap();
        assert_eq!(pay.value("hpay"), Some(&FieldValue::Int(999)));
        assert_eq!(pay.value("szFull"), Some(&FieldValue::Text("Test Payee".into())));
        assert_eq!(pay.value("fLocal"), Some(&FieldValue::Bool(true)));
        assert_eq!(pay.warnings.len(), 1);

        let xpay = synth
            .synthesize(MoneyTable::XPay, &columns(&["hpay", "amtBal"]), &intent)
            .unwrap();
        assert_eq!(xpay.value("amtBal").map(|v| v.to_string()), Some("0.00".to_string()));
    }

    #[test]
    fn test_payee_intent_cannot_fill_transaction_row() {
        let policy = SchemaPolicy::default();
        let synth = RowSynthesizer::new(&policy);
        let intent = PayeeIntent {
            payee_id: 1,
            display_name: "x".to_string(),
        };

        let err = synth
            .synthesize(MoneyTable::Trn, &columns(&["htrn"]), &intent)
            .unwrap_err();
        assert!(matches!(err, SyncError::IntentFieldMissing { field: "transaction_id", .. }));
    }

    #[test]
    fn test_critical_mismatches_reports_wrong_values_only() {
        let policy = SchemaPolicy::new(SentinelConstants::default());
        let stored = vec![
            ("frq", FieldValue::Int(-1)),
            ("grftt", FieldValue::Int(3)),
            ("fUpdated", FieldValue::Int(1)),
        ];

        let mismatches = critical_mismatches(&policy, MoneyTable::Trn, |column| {
            stored.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
        });

        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].column, "grftt");
        assert_eq!(mismatches[0].expected, FieldValue::Int(0));
        assert_eq!(mismatches[0].actual, FieldValue::Int(3));
    }
}
