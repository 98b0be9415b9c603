// 🗄️ Table Store - the only door into the money file
//
// The synthesizer and ledger never talk SQL; they go through TableStore.
// SqliteStore is the concrete backend: the Money tables live in a SQLite
// file, columns are discovered with PRAGMA table_info on every call.

use crate::error::StoreError;
use crate::value::{FieldValue, Record};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// One live column as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
}

/// Exact integer equality on a key column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPredicate {
    pub column: String,
    pub value: i64,
}

impl KeyPredicate {
    pub fn new(column: &str, value: i64) -> Self {
        KeyPredicate {
            column: column.to_string(),
            value,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// TABLE STORE CAPABILITY
// ============================================================================

/// Row-level access to a closed-schema store.
///
/// Columns are whatever the open file reports; callers must bind by name.
/// There is no multi-statement transaction: each call stands alone.
pub trait TableStore {
    fn open(path: &Path, credential: Option<&str>) -> StoreResult<Self>
    where
        Self: Sized;

    /// Live columns in store order. Empty when the table does not exist.
    fn columns(&self, table: &str) -> StoreResult<Vec<ColumnInfo>>;

    fn row_count(&self, table: &str) -> StoreResult<u64>;

    /// Every record of the table. Each call is a fresh scan.
    fn scan(&self, table: &str) -> StoreResult<Vec<Record>>;

    /// Append one row; `values` is positionally aligned to `columns`.
    fn append_row(&mut self, table: &str, columns: &[String], values: &[FieldValue]) -> StoreResult<()>;

    /// Overwrite one column of the records matching `key`. Returns rows touched.
    fn update_field(
        &mut self,
        table: &str,
        key: &KeyPredicate,
        column: &str,
        value: &FieldValue,
    ) -> StoreResult<usize>;

    /// Remove records matching `key`. Only used to undo our own append.
    fn delete_rows(&mut self, table: &str, key: &KeyPredicate) -> StoreResult<usize>;

    fn close(self) -> StoreResult<()>
    where
        Self: Sized;
}

// ============================================================================
// SQLITE BACKEND
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn in_memory() -> StoreResult<Self> {
        Ok(SqliteStore {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Raw connection, for seeding schemas in tests and tools
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Quote an identifier for SQLite ("a""b" style)
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TableStore for SqliteStore {
    fn open(path: &Path, credential: Option<&str>) -> StoreResult<Self> {
        let open_error = |reason: String| StoreError::Open {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(open_error("file does not exist".to_string()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| open_error(e.to_string()))?;

        // Encrypted builds take the key as a pragma; plain builds ignore it
        if let Some(key) = credential.filter(|c| !c.is_empty()) {
            conn.pragma_update(None, "key", key)
                .map_err(|e| open_error(format!("credential rejected: {}", e)))?;
        }

        // Force a read so a wrong credential or a non-database file fails here
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| open_error(format!("unreadable (wrong credential?): {}", e)))?;

        info!(path = %path.display(), "store opened");
        Ok(SqliteStore { conn })
    }

    fn columns(&self, table: &str) -> StoreResult<Vec<ColumnInfo>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;

        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(columns)
    }

    fn row_count(&self, table: &str) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;

        Ok(count.max(0) as u64)
    }

    fn scan(&self, table: &str) -> StoreResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();

        let records = stmt
            .query_map([], |row| {
                let mut fields = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    fields.push((name.clone(), FieldValue::from(row.get_ref(i)?)));
                }
                Ok(Record::new(fields))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn append_row(&mut self, table: &str, columns: &[String], values: &[FieldValue]) -> StoreResult<()> {
        if columns.len() != values.len() {
            return Err(StoreError::ColumnCountMismatch {
                table: table.to_string(),
                expected: columns.len(),
                got: values.len(),
            });
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            placeholders
        );
        debug!(table, columns = columns.len(), "appending row");

        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    fn update_field(
        &mut self,
        table: &str,
        key: &KeyPredicate,
        column: &str,
        value: &FieldValue,
    ) -> StoreResult<usize> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote_ident(table),
            quote_ident(column),
            quote_ident(&key.column)
        );
        debug!(table, column, key = key.value, "updating field");

        Ok(self.conn.execute(&sql, rusqlite::params![value, key.value])?)
    }

    fn delete_rows(&mut self, table: &str, key: &KeyPredicate) -> StoreResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(&key.column)
        );

        Ok(self.conn.execute(&sql, [key.value])?)
    }

    fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}
