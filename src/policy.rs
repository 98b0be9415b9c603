// 📐 Schema Field Policy - how every column of a synthesized row gets its value
//
// The host application silently rejects rows whose sentinel columns are off.
// Each table is described by a list of (column name, rule) entries; anything
// not listed is Unmapped and degrades to null with a warning, because newer
// files legitimately add columns we have not learned about yet.

use crate::config::SentinelConstants;
use crate::value::FieldValue;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoneyTable {
    /// Payees
    Pay,
    /// Payee running balances
    XPay,
    /// Transactions
    Trn,
    /// Accounts
    Acct,
    /// Extended account records (cached balance)
    XAcct,
}

impl MoneyTable {
    pub fn name(&self) -> &'static str {
        match self {
            MoneyTable::Pay => "PAY",
            MoneyTable::XPay => "XPAY",
            MoneyTable::Trn => "TRN",
            MoneyTable::Acct => "ACCT",
            MoneyTable::XAcct => "XACCT",
        }
    }

    pub fn from_name(name: &str) -> Option<MoneyTable> {
        match name.to_ascii_uppercase().as_str() {
            "PAY" => Some(MoneyTable::Pay),
            "XPAY" => Some(MoneyTable::XPay),
            "TRN" => Some(MoneyTable::Trn),
            "ACCT" => Some(MoneyTable::Acct),
            "XACCT" => Some(MoneyTable::XAcct),
            _ => None,
        }
    }

    /// Surrogate key column
    pub fn key_column(&self) -> &'static str {
        match self {
            MoneyTable::Pay | MoneyTable::XPay => "hpay",
            MoneyTable::Trn => "htrn",
            MoneyTable::Acct | MoneyTable::XAcct => "hacct",
        }
    }
}

impl fmt::Display for MoneyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stand-in for "no date": the store has no null date, so this instant
/// (2000-02-28 00:00:00.000) is written instead.
pub fn null_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 2, 28)
        .and_then(|d| d.and_hms_milli_opt(0, 0, 0, 0))
        .unwrap_or_default()
}

// ============================================================================
// POLICY TYPES
// ============================================================================

/// Intent fields a column can draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentField {
    PayeeId,
    PayeeName,
    TransactionId,
    AccountId,
    CategoryId,
    Amount,
    Memo,
    ReferenceNumber,
}

impl IntentField {
    pub fn name(&self) -> &'static str {
        match self {
            IntentField::PayeeId => "payee_id",
            IntentField::PayeeName => "display_name",
            IntentField::TransactionId => "transaction_id",
            IntentField::AccountId => "account_id",
            IntentField::CategoryId => "category_id",
            IntentField::Amount => "amount",
            IntentField::Memo => "memo",
            IntentField::ReferenceNumber => "reference_number",
        }
    }
}

/// Values produced at synthesis time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Wall clock at synthesis
    CurrentInstant,
    /// `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`, uppercase
    FreshGuid,
    /// Decimal zero carrying the column's fractional digits
    ZeroAmount { scale: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnPolicy {
    Constant(FieldValue),
    Computed(Generator),
    CallerSupplied(IntentField),
    /// Date column that must hold `null_date()`
    NullSentinel,
    Unmapped,
}

/// Members of the critical field set on TRN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalField {
    PostedFrequency,
    TransactionClass,
    Currency,
    Updated,
    InstallmentIndex,
}

impl CriticalField {
    pub fn required_value(&self, sentinels: &SentinelConstants) -> FieldValue {
        match self {
            CriticalField::PostedFrequency => FieldValue::Int(sentinels.posted_frequency),
            CriticalField::TransactionClass => FieldValue::Int(sentinels.transaction_class),
            CriticalField::Currency => FieldValue::Int(sentinels.currency_id),
            CriticalField::Updated => FieldValue::Bool(sentinels.updated),
            CriticalField::InstallmentIndex => FieldValue::Int(sentinels.installment_index),
        }
    }
}

/// Critical TRN columns and what governs each
pub const TRN_CRITICAL_FIELDS: &[(&str, CriticalField)] = &[
    ("frq", CriticalField::PostedFrequency),
    ("grftt", CriticalField::TransactionClass),
    ("lHcrncUser", CriticalField::Currency),
    ("fUpdated", CriticalField::Updated),
    ("iinst", CriticalField::InstallmentIndex),
];

// ============================================================================
// POLICY ENTRIES
// ============================================================================

/// Static form of a rule; `Critical` is resolved against the active sentinels
#[derive(Debug, Clone, Copy)]
enum Rule {
    Int(i64),
    Bool(bool),
    Null,
    NullDate,
    Now,
    Guid,
    Zero(u32),
    Caller(IntentField),
    Critical(CriticalField),
}

use IntentField as F;
use Rule::*;

const PAY_RULES: &[(&str, Rule)] = &[
    ("hpay", Caller(F::PayeeId)),
    ("szFull", Caller(F::PayeeName)),
    ("dtSerial", Now),
    ("fUpdated", Bool(true)),
    ("fLocal", Bool(true)),
];

const XPAY_RULES: &[(&str, Rule)] = &[
    ("hpay", Caller(F::PayeeId)),
    ("amtBal", Zero(2)),
];

const TRN_RULES: &[(&str, Rule)] = &[
    // identity and links
    ("htrn", Caller(F::TransactionId)),
    ("hacct", Caller(F::AccountId)),
    ("hacctLink", Null),
    ("lHpay", Caller(F::PayeeId)),
    ("hcat", Caller(F::CategoryId)),
    ("hsec", Null),
    ("htrnSrc", Null),
    ("hbillHead", Null),
    ("hstmtRel", Null),
    ("sguid", Guid),
    // dates
    ("dt", Now),
    ("dtSerial", Now),
    ("dtSent", NullDate),
    ("dtCleared", NullDate),
    ("dtPost", NullDate),
    ("dtCloseOffYear", NullDate),
    ("dtOldRel", NullDate),
    // amounts
    ("amt", Caller(F::Amount)),
    ("amtUser", Caller(F::Amount)),
    ("amtVat", Zero(4)),
    ("amtVATUser", Zero(4)),
    ("amtBase", Null),
    ("amtPreRec", Null),
    ("amtPreRec2", Null),
    ("dRateToBase", Null),
    // text
    ("szId", Caller(F::ReferenceNumber)),
    ("mMemo", Caller(F::Memo)),
    ("mFiStmtId", Null),
    ("szAggTrnId", Null),
    ("rgbDigest", Null),
    // critical
    ("frq", Critical(CriticalField::PostedFrequency)),
    ("grftt", Critical(CriticalField::TransactionClass)),
    ("lHcrncUser", Critical(CriticalField::Currency)),
    ("fUpdated", Critical(CriticalField::Updated)),
    ("iinst", Critical(CriticalField::InstallmentIndex)),
    // status codes and flags as found on posted transactions
    ("cs", Int(0)),
    ("oltt", Int(-1)),
    ("grfEntryMethods", Int(1)),
    ("ps", Int(0)),
    ("act", Int(-1)),
    ("cFrqInst", Null),
    ("olst", Int(-1)),
    ("grfstem", Int(0)),
    ("cpmtsRemaining", Int(-1)),
    ("instt", Int(-1)),
    ("payt", Int(-1)),
    ("grftf", Int(0)),
    ("lHtxsrc", Int(-1)),
    ("tef", Int(-1)),
    ("lHclsKak", Int(-1)),
    ("lHclsKak2", Null),
    ("lHclsKak3", Null),
    ("rt", Int(-1)),
    ("fDefPmt", Bool(false)),
    ("fPrint", Bool(false)),
    ("fDebtPlan", Bool(false)),
    ("fRefund", Bool(false)),
    ("fReimburse", Bool(false)),
    ("fCCPmt", Bool(false)),
    ("fDefBillAmt", Bool(false)),
    ("fDefBillDate", Bool(false)),
];

// ============================================================================
// SCHEMA POLICY
// ============================================================================

/// Name-keyed policy lookup for one schema profile. Immutable once built.
#[derive(Debug, Clone)]
pub struct SchemaPolicy {
    sentinels: SentinelConstants,
    tables: HashMap<MoneyTable, HashMap<&'static str, ColumnPolicy>>,
}

impl SchemaPolicy {
    pub fn new(sentinels: SentinelConstants) -> Self {
        let mut tables = HashMap::new();

        for (table, rules) in [
            (MoneyTable::Pay, PAY_RULES),
            (MoneyTable::XPay, XPAY_RULES),
            (MoneyTable::Trn, TRN_RULES),
        ] {
            let policies = rules
                .iter()
                .map(|(column, rule)| (*column, resolve(*rule, &sentinels)))
                .collect();
            tables.insert(table, policies);
        }

        SchemaPolicy { sentinels, tables }
    }

    pub fn sentinels(&self) -> &SentinelConstants {
        &self.sentinels
    }

    /// Rule for one column. Never fails: unknown tables and columns are Unmapped.
    pub fn policy_for(&self, table: MoneyTable, column: &str) -> ColumnPolicy {
        self.tables
            .get(&table)
            .and_then(|columns| columns.get(column))
            .cloned()
            .unwrap_or(ColumnPolicy::Unmapped)
    }

    /// Columns this policy knows for a table, in declaration order
    pub fn documented_columns(&self, table: MoneyTable) -> Vec<&'static str> {
        rules_for(table).iter().map(|(column, _)| *column).collect()
    }

    /// Critical columns of a table with their required values under this profile
    pub fn critical_fields(&self, table: MoneyTable) -> Vec<(&'static str, FieldValue)> {
        match table {
            MoneyTable::Trn => TRN_CRITICAL_FIELDS
                .iter()
                .map(|(column, field)| (*column, field.required_value(&self.sentinels)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self::new(SentinelConstants::default())
    }
}

fn rules_for(table: MoneyTable) -> &'static [(&'static str, Rule)] {
    match table {
        MoneyTable::Pay => PAY_RULES,
        MoneyTable::XPay => XPAY_RULES,
        MoneyTable::Trn => TRN_RULES,
        MoneyTable::Acct | MoneyTable::XAcct => &[],
    }
}

fn resolve(rule: Rule, sentinels: &SentinelConstants) -> ColumnPolicy {
    match rule {
        Int(v) => ColumnPolicy::Constant(FieldValue::Int(v)),
        Bool(v) => ColumnPolicy::Constant(FieldValue::Bool(v)),
        Null => ColumnPolicy::Constant(FieldValue::Null),
        NullDate => ColumnPolicy::NullSentinel,
        Now => ColumnPolicy::Computed(Generator::CurrentInstant),
        Guid => ColumnPolicy::Computed(Generator::FreshGuid),
        Zero(scale) => ColumnPolicy::Computed(Generator::ZeroAmount { scale }),
        Caller(field) => ColumnPolicy::CallerSupplied(field),
        Critical(field) => ColumnPolicy::Constant(field.required_value(sentinels)),
    }
}
