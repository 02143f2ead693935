//! `SQLite` backend built on `rusqlite`.
//!
//! The database path comes from [`ConnectionConfig::database`]; without one an in-memory
//! database is opened. Host, user and password are ignored.

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, Statement};

use crate::client::{ClientError, Connector, DbConnection};
use crate::config::ConnectionConfig;
use crate::escape::Dialect;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Code used for failures that did not come from the `SQLite` library itself.
pub const SQLITE_CLIENT_ERROR: i64 = -1;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SqliteConnector {
    type Conn = SqliteConnection;

    fn connect(&mut self, config: &ConnectionConfig) -> Result<SqliteConnection, ClientError> {
        let path = config.database.as_deref().unwrap_or(":memory:");
        let conn = Connection::open(path).map_err(client_error)?;
        tracing::debug!(path, "opened sqlite database");
        Ok(SqliteConnection { conn })
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// The underlying `rusqlite` handle.
    #[must_use]
    pub fn raw(&self) -> &Connection {
        &self.conn
    }
}

impl DbConnection for SqliteConnection {
    fn ping(&mut self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn set_charset(&mut self, charset: &str) -> Result<(), ClientError> {
        // Only the UTF encodings exist here, and they only take effect on a new database.
        let encoding = match charset.to_ascii_lowercase().as_str() {
            "utf8" | "utf8mb4" | "utf-8" => "UTF-8",
            "utf16" | "utf-16" => "UTF-16",
            "utf16le" | "utf-16le" => "UTF-16le",
            "utf16be" | "utf-16be" => "UTF-16be",
            _ => {
                return Err(ClientError::new(
                    SQLITE_CLIENT_ERROR,
                    format!("Unknown character set: '{charset}'"),
                ));
            }
        };
        run_ignoring_rows(&self.conn, &format!("PRAGMA encoding = '{encoding}'"))
    }

    fn execute(&mut self, sql: &str) -> Result<ResultSet, ClientError> {
        let mut stmt = self.conn.prepare(sql).map_err(client_error)?;
        if stmt.column_count() > 0 {
            return build_result_set(&mut stmt).map_err(client_error);
        }
        let changed = stmt.execute([]).map_err(client_error)?;
        Ok(ResultSet::affected(changed))
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn begin(&mut self) -> Result<(), ClientError> {
        self.conn.execute_batch("BEGIN").map_err(client_error)
    }

    fn close(self) {
        if let Err((_, err)) = self.conn.close() {
            tracing::warn!(error = %err, "sqlite close failed");
        }
    }
}

/// Collect every row of a statement that returns columns.
///
/// # Errors
/// Returns the `rusqlite` error from stepping or reading a column.
pub fn build_result_set(stmt: &mut Statement<'_>) -> Result<ResultSet, rusqlite::Error> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            let value: Value = row.get(idx)?;
            row_values.push(sql_value(value));
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

fn sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

fn run_ignoring_rows(conn: &Connection, sql: &str) -> Result<(), ClientError> {
    let mut stmt = conn.prepare(sql).map_err(client_error)?;
    let mut rows = stmt.query([]).map_err(client_error)?;
    while rows.next().map_err(client_error)?.is_some() {}
    Ok(())
}

/// Keep the extended result code so callers can tell e.g. a constraint from a busy error.
fn client_error(err: rusqlite::Error) -> ClientError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => ClientError::new(
            i64::from(failure.extended_code),
            message.clone().unwrap_or_else(|| failure.to_string()),
        ),
        other => ClientError::new(SQLITE_CLIENT_ERROR, other.to_string()),
    }
}
