// 🔄 Consistency Orchestrator - the two-table writes the domain needs
//
//   insert payee        = PAY row + zero-balance XPAY row (both or neither)
//   insert transaction  = TRN row, then XACCT balance += amount
//
// Every operation runs against one open store (one unit of work). The store
// has no multi-statement transaction, so a failure after the TRN append is
// surfaced as PartialSyncFailure rather than a plain error.

use crate::config::SyncConfig;
use crate::error::{FieldMismatch, Result, SchemaMismatch, SyncError};
use crate::ids::{keys_in, next_id, IdSpace};
use crate::ledger::{update_account_balance, BalanceUpdate};
use crate::policy::{MoneyTable, SchemaPolicy};
use crate::store::{ColumnInfo, KeyPredicate, TableStore};
use crate::synth::{critical_mismatches, PayeeIntent, RowSynthesizer, TransactionIntent, UnmappedColumn};
use crate::value::{FieldValue, Record};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PayeeInsertion {
    pub payee_id: i64,
    pub warnings: Vec<UnmappedColumn>,
}

/// A fully synced transaction: row written and balance adjusted
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSync {
    pub transaction_id: i64,
    pub warnings: Vec<UnmappedColumn>,
    pub verification: Option<VerificationReport>,
    pub balance: BalanceUpdate,
}

/// Read-back of one transaction. Diagnostic only; never fails an operation.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub transaction_id: i64,
    /// Records carrying this id (1 is the only healthy answer)
    pub matches: usize,
    pub mismatches: Vec<FieldMismatch>,
    pub record: Option<Record>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.matches == 1 && self.mismatches.is_empty()
    }
}

/// Live columns and every record of one table
#[derive(Debug, Clone, Serialize)]
pub struct TableListing {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub records: Vec<Record>,
}

// ============================================================================
// SYNC ENGINE
// ============================================================================

pub struct SyncEngine<'s, S: TableStore> {
    store: &'s mut S,
    policy: SchemaPolicy,
    verify_after_insert: bool,
}

impl<'s, S: TableStore> SyncEngine<'s, S> {
    pub fn new(store: &'s mut S, config: &SyncConfig) -> Self {
        info!(profile = %config.sentinels.profile, "sync engine ready");
        SyncEngine {
            store,
            policy: SchemaPolicy::new(config.sentinels.clone()),
            verify_after_insert: config.verify_after_insert,
        }
    }

    pub fn policy(&self) -> &SchemaPolicy {
        &self.policy
    }

    /// Live column names; an absent table is a schema mismatch
    fn live_columns(&self, table: MoneyTable) -> Result<Vec<String>> {
        let columns = self.store.columns(table.name())?;
        if columns.is_empty() {
            return Err(SchemaMismatch::TableMissing {
                table: table.name().to_string(),
            }
            .into());
        }
        Ok(columns.into_iter().map(|c| c.name).collect())
    }

    /// Refuse a surrogate key that is already present
    fn ensure_key_unused(&self, table: MoneyTable, columns: &[String], key: i64) -> Result<()> {
        let key_column = table.key_column();
        if !columns.iter().any(|c| c == key_column) {
            return Err(SchemaMismatch::KeyColumnMissing {
                table: table.name().to_string(),
                column: key_column.to_string(),
            }
            .into());
        }

        let records = self.store.scan(table.name())?;
        if keys_in(&records, key_column).any(|k| k == key) {
            return Err(SyncError::DuplicateKey {
                table: table.name().to_string(),
                column: key_column.to_string(),
                key,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // PAYEE
    // ------------------------------------------------------------------------

    /// Write PAY + XPAY for one payee. Both rows land or neither does.
    pub fn insert_payee(&mut self, intent: &PayeeIntent) -> Result<PayeeInsertion> {
        let payee_id = intent.payee_id;
        let pay_columns = self.live_columns(MoneyTable::Pay)?;
        let xpay_columns = self.live_columns(MoneyTable::XPay)?;
        self.ensure_key_unused(MoneyTable::Pay, &pay_columns, payee_id)?;
        self.ensure_key_unused(MoneyTable::XPay, &xpay_columns, payee_id)?;

        // Both rows are built before anything is written
        let synth = RowSynthesizer::new(&self.policy);
        let pay = synth.synthesize(MoneyTable::Pay, &pay_columns, intent)?;
        let xpay = synth.synthesize(MoneyTable::XPay, &xpay_columns, intent)?;

        self.store.append_row(MoneyTable::Pay.name(), &pay.columns, &pay.values)?;
        info!(payee_id, "inserted PAY row");

        if let Err(append_err) = self.store.append_row(MoneyTable::XPay.name(), &xpay.columns, &xpay.values) {
            let key = KeyPredicate::new(MoneyTable::Pay.key_column(), payee_id);
            return match self.store.delete_rows(MoneyTable::Pay.name(), &key) {
                Ok(_) => {
                    warn!(payee_id, "XPAY append failed; PAY row removed again");
                    Err(append_err.into())
                }
                Err(undo_err) => {
                    error!(payee_id, %undo_err, "XPAY append failed and PAY row could not be removed");
                    Err(SyncError::PartialPayeeFailure {
                        payee_id,
                        source: Box::new(append_err.into()),
                    })
                }
            };
        }
        info!(payee_id, "inserted XPAY row");

        let mut warnings = pay.warnings;
        warnings.extend(xpay.warnings);
        Ok(PayeeInsertion { payee_id, warnings })
    }

    // ------------------------------------------------------------------------
    // TRANSACTION
    // ------------------------------------------------------------------------

    /// Write the TRN row, then move the account balance by the same amount.
    pub fn insert_transaction(&mut self, intent: &TransactionIntent) -> Result<TransactionSync> {
        let transaction_id = intent.transaction_id;
        let columns = self.live_columns(MoneyTable::Trn)?;
        self.ensure_key_unused(MoneyTable::Trn, &columns, transaction_id)?;

        let row = RowSynthesizer::new(&self.policy).synthesize(MoneyTable::Trn, &columns, intent)?;

        self.store.append_row(MoneyTable::Trn.name(), &row.columns, &row.values)?;
        info!(transaction_id, account_id = intent.account_id, amount = %intent.amount, "inserted TRN row");

        // From here on the TRN row exists; failures are partial
        let verification = if self.verify_after_insert {
            match self.verify_transaction(transaction_id) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(transaction_id, "read-back failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let balance = update_account_balance(&mut *self.store, intent.account_id, intent.amount).map_err(|e| {
            error!(transaction_id, account_id = intent.account_id, "balance update failed after TRN append");
            SyncError::PartialSyncFailure {
                transaction_id,
                account_id: intent.account_id,
                source: Box::new(e),
            }
        })?;

        Ok(TransactionSync {
            transaction_id,
            warnings: row.warnings,
            verification,
            balance,
        })
    }

    /// Stand-alone balance adjustment
    pub fn update_balance(&mut self, account_id: i64, delta: Decimal) -> Result<BalanceUpdate> {
        update_account_balance(&mut *self.store, account_id, delta)
    }

    // ------------------------------------------------------------------------
    // DIAGNOSTICS
    // ------------------------------------------------------------------------

    /// Re-scan TRN for `transaction_id` and check its critical fields.
    pub fn verify_transaction(&self, transaction_id: i64) -> Result<VerificationReport> {
        let table = MoneyTable::Trn;
        let records = self.store.scan(table.name())?;
        let found: Vec<&Record> = records
            .iter()
            .filter(|r| r.get(table.key_column()).and_then(FieldValue::as_i64) == Some(transaction_id))
            .collect();

        let mismatches = found
            .iter()
            .flat_map(|record| critical_mismatches(&self.policy, table, |column| record.get(column)))
            .collect::<Vec<_>>();

        for mismatch in &mismatches {
            warn!(transaction_id, "critical field off: {}", mismatch);
        }
        if found.len() != 1 {
            warn!(transaction_id, matches = found.len(), "expected exactly one TRN record");
        }

        Ok(VerificationReport {
            transaction_id,
            matches: found.len(),
            mismatches,
            record: found.first().map(|r| (*r).clone()),
        })
    }

    /// Check an existing transaction against the critical constants.
    /// Unlike verification, a missing reference transaction is an error.
    pub fn compare(&self, transaction_id: i64) -> Result<VerificationReport> {
        let report = self.verify_transaction(transaction_id)?;
        if report.matches == 0 {
            return Err(SyncError::RecordNotFound {
                table: MoneyTable::Trn.name().to_string(),
                column: MoneyTable::Trn.key_column().to_string(),
                key: transaction_id,
            });
        }
        Ok(report)
    }

    /// Next unused surrogate key in TRN or PAY
    pub fn next_id(&self, space: IdSpace) -> Result<i64> {
        let table = space.table();
        let columns = self.live_columns(table)?;
        if !columns.iter().any(|c| c == table.key_column()) {
            return Err(SchemaMismatch::KeyColumnMissing {
                table: table.name().to_string(),
                column: table.key_column().to_string(),
            }
            .into());
        }

        let records = self.store.scan(table.name())?;
        next_id(keys_in(&records, table.key_column())).ok_or_else(|| SyncError::KeySpaceExhausted {
            table: table.name().to_string(),
            column: table.key_column().to_string(),
        })
    }

    pub fn listing(&self, table: MoneyTable) -> Result<TableListing> {
        let columns = self.store.columns(table.name())?;
        if columns.is_empty() {
            return Err(SchemaMismatch::TableMissing {
                table: table.name().to_string(),
            }
            .into());
        }

        Ok(TableListing {
            table: table.name().to_string(),
            columns,
            records: self.store.scan(table.name())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SentinelConstants;
    use crate::fixtures::money_store;
    use crate::ledger::coerce_balance;
    use crate::policy::null_date;
    use crate::store::SqliteStore;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn create_test_payee() -> PayeeIntent {
        PayeeIntent {
            payee_id: 999,
            display_name: "Test Payee".to_string(),
        }
    }

    fn create_test_transaction(account_id: i64) -> TransactionIntent {
        TransactionIntent {
            transaction_id: 500,
            account_id,
            category_id: None,
            payee_id: 999,
            amount: dec("-50.00"),
            memo: "Grocery shopping".to_string(),
            reference_number: String::new(),
        }
    }

    fn find(store: &SqliteStore, table: &str, key_column: &str, key: i64) -> Vec<Record> {
        store
            .scan(table)
            .unwrap()
            .into_iter()
            .filter(|r| r.get(key_column) == Some(&FieldValue::Int(key)))
            .collect()
    }

    fn balance(store: &SqliteStore, account_id: i64) -> Decimal {
        let rows = find(store, "XACCT", "hacct", account_id);
        coerce_balance(rows[0].get("amtBalance").unwrap()).unwrap()
    }

    #[test]
    fn test_insert_payee_writes_both_rows() {
        let mut store = money_store();
        let config = SyncConfig::default();

        let inserted = SyncEngine::new(&mut store, &config)
            .insert_payee(&create_test_payee())
            .unwrap();

        assert_eq!(inserted.payee_id, 999);
        // hcntct is not in the policy
        assert_eq!(inserted.warnings.len(), 1);
        assert_eq!(inserted.warnings[0].column, "hcntct");

        let pay = find(&store, "PAY", "hpay", 999);
        assert_eq!(pay.len(), 1);
        assert_eq!(pay[0].get("szFull"), Some(&FieldValue::Text("Test Payee".into())));
        assert_eq!(pay[0].get("hcntct"), Some(&FieldValue::Null));

        let xpay = find(&store, "XPAY", "hpay", 999);
        assert_eq!(xpay.len(), 1);
        assert_eq!(xpay[0].get("amtBal").and_then(coerce_balance), Some(dec("0.00")));
    }

    #[test]
    fn test_insert_payee_refuses_used_id() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let intent = PayeeIntent {
            payee_id: 12,
            display_name: "Again".to_string(),
        };

        let err = SyncEngine::new(&mut store, &config).insert_payee(&intent).unwrap_err();

        assert!(matches!(err, SyncError::DuplicateKey { key: 12, .. }));
        assert_eq!(store.row_count("PAY").unwrap(), 1);
        assert_eq!(store.row_count("XPAY").unwrap(), 1);
    }

    #[test]
    fn test_insert_payee_rolls_back_when_xpay_fails() {
        let mut store = money_store();
        store
            .connection()
            .execute_batch(
                "DROP TABLE XPAY;
                 CREATE TABLE XPAY (hpay INTEGER, amtBal CURRENCY, lRequired INTEGER NOT NULL);",
            )
            .unwrap();
        let config = SyncConfig::default();

        let err = SyncEngine::new(&mut store, &config)
            .insert_payee(&create_test_payee())
            .unwrap_err();

        assert!(!err.is_partial());
        assert!(find(&store, "PAY", "hpay", 999).is_empty());
        assert_eq!(store.row_count("XPAY").unwrap(), 0);
    }

    #[test]
    fn test_insert_payee_partial_when_rollback_fails() {
        let mut store = money_store();
        store
            .connection()
            .execute_batch(
                "DROP TABLE XPAY;
                 CREATE TABLE XPAY (hpay INTEGER, amtBal CURRENCY, lRequired INTEGER NOT NULL);
                 CREATE TRIGGER pay_locked BEFORE DELETE ON PAY BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();
        let config = SyncConfig::default();

        let err = SyncEngine::new(&mut store, &config)
            .insert_payee(&create_test_payee())
            .unwrap_err();

        assert!(matches!(err, SyncError::PartialPayeeFailure { payee_id: 999, .. }));
        assert_eq!(find(&store, "PAY", "hpay", 999).len(), 1);
    }

    #[test]
    fn test_insert_transaction_fully_synced() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let before = balance(&store, 2);

        let synced = SyncEngine::new(&mut store, &config)
            .insert_transaction(&create_test_transaction(2))
            .unwrap();

        assert_eq!(synced.transaction_id, 500);
        assert_eq!(synced.balance.account_id, 2);
        assert_eq!(synced.balance.column, "amtBalance");
        assert_eq!(synced.warnings.len(), 1);
        assert!(synced.verification.as_ref().unwrap().is_clean());

        let rows = find(&store, "TRN", "htrn", 500);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("frq"), Some(&FieldValue::Int(-1)));
        assert_eq!(row.get("grftt"), Some(&FieldValue::Int(0)));
        assert_eq!(row.get("lHcrncUser"), Some(&FieldValue::Int(45)));
        assert_eq!(row.get("fUpdated"), Some(&FieldValue::Int(1)));
        assert_eq!(row.get("iinst"), Some(&FieldValue::Int(-1)));
        assert_eq!(row.get("amt").and_then(FieldValue::to_decimal), Some(dec("-50.00")));
        assert_eq!(row.get("hacct"), Some(&FieldValue::Int(2)));
        assert_eq!(row.get("lHpay"), Some(&FieldValue::Int(999)));
        assert_eq!(row.get("hcat"), Some(&FieldValue::Null));
        assert!(row.get("dtPost").unwrap().loosely_equals(&FieldValue::DateTime(null_date())));

        assert_eq!(balance(&store, 2), before - dec("50.00"));
        assert_eq!(balance(&store, 1), dec("250.75"));
    }

    #[test]
    fn test_insert_transaction_partial_failure_names_both_ids() {
        let mut store = money_store();
        store
            .connection()
            .execute("DELETE FROM XACCT WHERE hacct = 2", [])
            .unwrap();
        let config = SyncConfig::default();

        let err = SyncEngine::new(&mut store, &config)
            .insert_transaction(&create_test_transaction(2))
            .unwrap_err();

        match &err {
            SyncError::PartialSyncFailure {
                transaction_id,
                account_id,
                source,
            } => {
                assert_eq!(*transaction_id, 500);
                assert_eq!(*account_id, 2);
                assert!(matches!(**source, SyncError::AccountNotFound { account_id: 2, .. }));
            }
            other => panic!("expected partial sync failure, got {:?}", other),
        }
        assert!(err.is_partial());
        // the TRN row is there; the operator has to reconcile
        assert_eq!(find(&store, "TRN", "htrn", 500).len(), 1);
    }

    #[test]
    fn test_insert_transaction_duplicate_id_writes_nothing() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let mut intent = create_test_transaction(2);
        intent.transaction_id = 252;
        let before = balance(&store, 2);

        let err = SyncEngine::new(&mut store, &config)
            .insert_transaction(&intent)
            .unwrap_err();

        assert!(matches!(err, SyncError::DuplicateKey { key: 252, .. }));
        assert_eq!(store.row_count("TRN").unwrap(), 2);
        assert_eq!(balance(&store, 2), before);
    }

    #[test]
    fn test_missing_trn_table_aborts_before_write() {
        let mut store = money_store();
        store.connection().execute_batch("DROP TABLE TRN;").unwrap();
        let config = SyncConfig::default();
        let before = balance(&store, 2);

        let err = SyncEngine::new(&mut store, &config)
            .insert_transaction(&create_test_transaction(2))
            .unwrap_err();

        assert!(matches!(err, SyncError::SchemaMismatch(SchemaMismatch::TableMissing { .. })));
        assert_eq!(balance(&store, 2), before);
    }

    #[test]
    fn test_configured_currency_is_written() {
        let mut store = money_store();
        let config = SyncConfig {
            sentinels: SentinelConstants {
                currency_id: 51,
                ..SentinelConstants::default()
            },
            verify_after_insert: false,
        };

        let synced = SyncEngine::new(&mut store, &config)
            .insert_transaction(&create_test_transaction(1))
            .unwrap();

        assert!(synced.verification.is_none());
        let rows = find(&store, "TRN", "htrn", 500);
        assert_eq!(rows[0].get("lHcrncUser"), Some(&FieldValue::Int(51)));
        assert_eq!(balance(&store, 1), dec("200.75"));
    }

    #[test]
    fn test_update_balance_round_trip_is_exact() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let mut engine = SyncEngine::new(&mut store, &config);

        for delta in ["0.01", "-0.01", "0.01", "0.01", "-0.01", "-0.01"] {
            engine.update_balance(1, dec(delta)).unwrap();
        }

        assert_eq!(balance(&store, 1), dec("250.75"));
    }

    #[test]
    fn test_compare_reports_bad_reference() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let engine = SyncEngine::new(&mut store, &config);

        let good = engine.compare(252).unwrap();
        assert!(good.is_clean());

        let bad = engine.compare(253).unwrap();
        assert!(!bad.is_clean());
        let columns: Vec<_> = bad.mismatches.iter().map(|m| m.column.as_str()).collect();
        assert_eq!(columns, vec!["frq", "fUpdated"]);

        let missing = engine.compare(7777).unwrap_err();
        assert!(matches!(missing, SyncError::RecordNotFound { key: 7777, .. }));
    }

    #[test]
    fn test_next_id() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let engine = SyncEngine::new(&mut store, &config);

        assert_eq!(engine.next_id(IdSpace::Transaction).unwrap(), 254);
        assert_eq!(engine.next_id(IdSpace::Payee).unwrap(), 13);
    }

    #[test]
    fn test_next_id_on_empty_table() {
        let mut store = money_store();
        store.connection().execute("DELETE FROM TRN", []).unwrap();
        let config = SyncConfig::default();

        assert_eq!(SyncEngine::new(&mut store, &config).next_id(IdSpace::Transaction).unwrap(), 1);
    }

    #[test]
    fn test_next_id_refuses_when_keys_run_out() {
        let mut store = money_store();
        store
            .connection()
            .execute(&format!("UPDATE TRN SET htrn = {} WHERE htrn = 253", i64::MAX), [])
            .unwrap();
        let config = SyncConfig::default();

        let err = SyncEngine::new(&mut store, &config)
            .next_id(IdSpace::Transaction)
            .unwrap_err();
        assert!(matches!(err, SyncError::KeySpaceExhausted { .. }));
    }

    #[test]
    fn test_listing() {
        let mut store = money_store();
        let config = SyncConfig::default();
        let engine = SyncEngine::new(&mut store, &config);

        let accounts = engine.listing(MoneyTable::Acct).unwrap();
        assert_eq!(accounts.columns.len(), 5);
        assert_eq!(accounts.records.len(), 2);
        assert!(engine.listing(MoneyTable::Pay).is_ok());
    }
}
