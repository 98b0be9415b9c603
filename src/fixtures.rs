// Test fixture: an in-memory store shaped like a Money file

use crate::policy::{MoneyTable, SchemaPolicy};
use crate::store::SqliteStore;

/// Declared type for a Money column, by naming convention
fn declared_type(column: &str) -> &'static str {
    let second_upper = column.chars().nth(1).map_or(false, |c| c.is_ascii_uppercase());

    if column.starts_with("dt") {
        "DATETIME"
    } else if column.starts_with("amt") {
        "CURRENCY"
    } else if column.starts_with('f') && second_upper {
        "BOOLEAN"
    } else if column.starts_with("sz") || column.starts_with("sguid") || (column.starts_with('m') && second_upper) {
        "TEXT"
    } else if column.starts_with("rgb") {
        "BLOB"
    } else if column.starts_with('d') {
        "DOUBLE"
    } else {
        "INTEGER"
    }
}

fn create_table_sql(table: &str, columns: &[&str]) -> String {
    let defs = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c, declared_type(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({});", table, defs)
}

/// PAY, XPAY and TRN carry every documented column plus one the policy has
/// never heard of; XACCT uses the older `amtBalance` name. Accounts 1 and 2
/// exist; TRN holds a well-formed transaction 252 and a malformed 253.
pub(crate) fn money_store() -> SqliteStore {
    let policy = SchemaPolicy::default();
    let store = SqliteStore::in_memory().unwrap();

    let mut pay = policy.documented_columns(MoneyTable::Pay);
    pay.push("hcntct");
    let xpay = policy.documented_columns(MoneyTable::XPay);
    let mut trn = policy.documented_columns(MoneyTable::Trn);
    trn.push("szFutureField");

    let mut sql = String::new();
    sql.push_str(&create_table_sql("PAY", &pay));
    sql.push_str(&create_table_sql("XPAY", &xpay));
    sql.push_str(&create_table_sql("TRN", &trn));
    sql.push_str(
        "CREATE TABLE ACCT (hacct INTEGER, szFull TEXT, at INTEGER, fClosed BOOLEAN, hcrnc INTEGER);
         INSERT INTO ACCT VALUES (1, 'Savings', 1, 0, 45);
         INSERT INTO ACCT VALUES (2, 'Checking', 0, 0, 45);
         CREATE TABLE XACCT (hacct INTEGER, amtBalance CURRENCY, dtLastRecon DATETIME);
         INSERT INTO XACCT VALUES (1, 250.75, '2000-02-28 00:00:00');
         INSERT INTO XACCT VALUES (2, 1000.00, '2000-02-28 00:00:00');
         INSERT INTO PAY (hpay, szFull, fUpdated, fLocal) VALUES (12, 'Corner Shop', 1, 1);
         INSERT INTO XPAY (hpay, amtBal) VALUES (12, 0);
         INSERT INTO TRN (htrn, hacct, amt, frq, grftt, lHcrncUser, fUpdated, iinst, lHpay)
             VALUES (252, 2, -20.00, -1, 0, 45, 1, -1, 12);
         INSERT INTO TRN (htrn, hacct, amt, frq, grftt, lHcrncUser, fUpdated, iinst, lHpay)
             VALUES (253, 2, -5.00, 0, 0, 45, 0, -1, 12);",
    );

    store.connection().execute_batch(&sql).unwrap();
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_types() {
        assert_eq!(declared_type("dtPost"), "DATETIME");
        assert_eq!(declared_type("amtVat"), "CURRENCY");
        assert_eq!(declared_type("fUpdated"), "BOOLEAN");
        assert_eq!(declared_type("frq"), "INTEGER");
        assert_eq!(declared_type("mMemo"), "TEXT");
        assert_eq!(declared_type("dRateToBase"), "DOUBLE");
    }
}
