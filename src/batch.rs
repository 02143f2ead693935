//! Multi-row `INSERT` accumulated in memory and sent in chunks.

use crate::client::Connector;
use crate::error::SqlGuardError;
use crate::escape::{escape_ident, escape_literal};
use crate::executor::Database;
use crate::types::SqlValue;

/// Statement size at which [`BatchInsert::add`] flushes before appending another row.
pub const DEFAULT_BATCH_BYTES: usize = 250_000;

/// Collects rows for one table into a single `INSERT ... VALUES (..), (..)` statement.
///
/// Rows are escaped as they are added, using the quoting rules of the database they are
/// added through. Once the pending statement reaches the size limit the next
/// [`add`](Self::add) sends it first. Call [`flush`](Self::flush) when done; pending rows are
/// not sent on drop.
///
/// ```rust
/// use sql_guard::prelude::*;
/// use sql_guard::sqlite::SqliteConnector;
///
/// let mut db = Database::new(SqliteConnector::new(), ConnectionConfig::new("", "", ""));
/// db.execute("CREATE TABLE t (id INTEGER, name TEXT)")?;
///
/// let mut batch = BatchInsert::new("t", &["id", "name"])?;
/// batch.add(&mut db, &[SqlValue::Int(1), SqlValue::from("ann")])?;
/// batch.add(&mut db, &[SqlValue::Int(2), SqlValue::from("O'Brien")])?;
/// assert_eq!(batch.flush(&mut db)?, 2);
/// assert_eq!(db.get_one("SELECT COUNT(*) FROM t", &[])?, Some(SqlValue::Int(2)));
/// # Ok::<(), SqlGuardError>(())
/// ```
#[derive(Debug)]
pub struct BatchInsert {
    table: String,
    columns: String,
    column_count: usize,
    ignore: bool,
    size_limit: usize,
    pending: String,
    pending_rows: usize,
}

impl BatchInsert {
    /// # Errors
    /// `EmptyIdentifierError` for an empty table or column name, `EmptyPayloadError` when
    /// no columns are given.
    pub fn new(table: &str, columns: &[&str]) -> Result<Self, SqlGuardError> {
        if columns.is_empty() {
            return Err(SqlGuardError::EmptyPayloadError);
        }
        let quoted = columns
            .iter()
            .map(|column| escape_ident(column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            table: escape_ident(table)?,
            columns: quoted.join(","),
            column_count: columns.len(),
            ignore: false,
            size_limit: DEFAULT_BATCH_BYTES,
            pending: String::new(),
            pending_rows: 0,
        })
    }

    /// Skip rows that collide with a unique key instead of failing the whole statement.
    #[must_use]
    pub fn with_ignore(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    /// Flush threshold in bytes of SQL text. Zero sends every row on its own.
    #[must_use]
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Append one row, flushing the pending statement first if it is already at the limit.
    ///
    /// # Errors
    /// `ArityError` when `values` does not have one entry per column; otherwise whatever the
    /// flush returns.
    pub fn add<C: Connector>(
        &mut self,
        db: &mut Database<C>,
        values: &[SqlValue],
    ) -> Result<(), SqlGuardError> {
        if values.len() != self.column_count {
            return Err(SqlGuardError::ArityError {
                placeholders: self.column_count,
                args: values.len(),
                template: format!("{} ({})", self.table, self.columns),
            });
        }
        if !self.pending.is_empty() && self.pending.len() >= self.size_limit {
            self.flush(db)?;
        }

        let dialect = db.dialect();
        if self.pending.is_empty() {
            self.pending = format!(
                "{} {} ({}) VALUES (",
                dialect.insert_keyword(self.ignore),
                self.table,
                self.columns
            );
        } else {
            self.pending.push_str(", (");
        }
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.pending.push(',');
            }
            self.pending.push_str(&escape_literal(dialect, value));
        }
        self.pending.push(')');
        self.pending_rows += 1;
        Ok(())
    }

    /// Send the pending statement, if any, and return how many rows it carried.
    ///
    /// The pending rows are dropped whether or not the statement succeeds.
    ///
    /// # Errors
    /// `ConnectError` or `QueryError` from the database.
    pub fn flush<C: Connector>(&mut self, db: &mut Database<C>) -> Result<usize, SqlGuardError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let sql = std::mem::take(&mut self.pending);
        let rows = std::mem::take(&mut self.pending_rows);
        tracing::debug!(table = %self.table, rows, bytes = sql.len(), "flushing batch insert");
        db.execute(&sql)?;
        Ok(rows)
    }

    #[must_use]
    pub fn pending_rows(&self) -> usize {
        self.pending_rows
    }

    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_rows == 0
    }
}

impl Drop for BatchInsert {
    fn drop(&mut self) {
        if self.pending_rows > 0 {
            tracing::warn!(
                table = %self.table,
                rows = self.pending_rows,
                "batch insert dropped with unflushed rows"
            );
        }
    }
}
