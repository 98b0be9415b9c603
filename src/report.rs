// 📋 Reporting - text blocks and CSV for table dumps and verification
//
// Everything renders into a String (or any io::Write for CSV) so the CLI
// decides where it goes.

use crate::policy::{MoneyTable, SchemaPolicy};
use crate::store::ColumnInfo;
use crate::sync::{TableListing, VerificationReport};
use crate::value::{FieldValue, Record};
use std::fmt::Write as _;
use std::io;

const RULE: &str = "========================================";

/// `[i] name (type)` per live column, 1-based like the host tool shows them
pub fn render_columns(columns: &[ColumnInfo]) -> String {
    let mut out = String::new();
    for (i, column) in columns.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {} ({})", i + 1, column.name, column.declared_type);
    }
    out
}

/// One block per record. Critical columns carry their expected value.
pub fn render_listing(listing: &TableListing, policy: &SchemaPolicy) -> String {
    let table = MoneyTable::from_name(&listing.table);
    let critical = table.map(|t| policy.critical_fields(t)).unwrap_or_default();
    let title = table.map_or("Record", record_title);

    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", listing.table);
    let _ = writeln!(out, "Total records: {}", listing.records.len());
    let _ = writeln!(out, "\nColumns:");
    out.push_str(&render_columns(&listing.columns));

    for (n, record) in listing.records.iter().enumerate() {
        let _ = writeln!(out, "\n{}", RULE);
        let _ = writeln!(out, "{} #{}:", title, n + 1);
        let _ = writeln!(out, "{}", RULE);
        out.push_str(&render_record(record, &critical));
    }
    out
}

fn render_record(record: &Record, critical: &[(&'static str, FieldValue)]) -> String {
    let mut out = String::new();
    for (i, (column, value)) in record.fields().iter().enumerate() {
        let _ = write!(out, "  [{}] {}: {}", i + 1, column, value);
        if let Some((_, expected)) = critical.iter().find(|(c, _)| c == column) {
            let flag = if expected.loosely_equals(value) { "" } else { " ⚠️" };
            let _ = write!(out, " (should be {}){}", expected, flag);
        }
        out.push('\n');
    }
    out
}

fn record_title(table: MoneyTable) -> &'static str {
    match table {
        MoneyTable::Trn => "Transaction",
        MoneyTable::Pay | MoneyTable::XPay => "Payee",
        MoneyTable::Acct | MoneyTable::XAcct => "Account",
    }
}

/// Header row of live column names, then one row per record. Nulls are empty.
pub fn write_csv<W: io::Write>(listing: &TableListing, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(listing.columns.iter().map(|c| c.name.as_str()))?;

    for record in &listing.records {
        let row: Vec<String> = listing
            .columns
            .iter()
            .map(|c| match record.get(&c.name) {
                None | Some(FieldValue::Null) => String::new(),
                Some(value) => value.to_string(),
            })
            .collect();
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Outcome of a read-back or compare
pub fn render_verification(report: &VerificationReport, policy: &SchemaPolicy) -> String {
    let mut out = String::new();
    match report.matches {
        0 => {
            let _ = writeln!(out, "⚠️  transaction {} not found", report.transaction_id);
        }
        1 => {
            let _ = writeln!(out, "✓ Found transaction {}", report.transaction_id);
        }
        n => {
            let _ = writeln!(out, "⚠️  {} records carry htrn = {}", n, report.transaction_id);
        }
    }

    if let Some(record) = &report.record {
        out.push_str(&render_record(record, &policy.critical_fields(MoneyTable::Trn)));
    }

    if report.is_clean() {
        let _ = writeln!(out, "✓ All critical fields match");
    } else {
        for mismatch in &report.mismatches {
            let _ = writeln!(out, "✗ {}", mismatch);
        }
    }
    out
}

/// The constants every TRN row must carry under the active profile
pub fn render_critical_expectations(policy: &SchemaPolicy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Critical TRN fields ({} profile):", policy.sentinels().profile);
    for (column, expected) in policy.critical_fields(MoneyTable::Trn) {
        let _ = writeln!(out, "  {} = {}", column, expected);
    }
    out
}
