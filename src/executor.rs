//! Statement execution on top of the connection lifecycle.
//!
//! [`Database`] is the object callers hold: it compiles templates, runs the SQL with at most
//! one transparent retry after a dropped connection, records timing, and funnels fatal
//! conditions to the error hook.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::client::{Connector, DbConnection};
use crate::config::{ConnectionConfig, ManagerOptions};
use crate::connection::{ConnectionManager, ConnectionState, LifecycleCounters};
use crate::error::SqlGuardError;
use crate::escape::{Dialect, escape_insert_values};
use crate::report::ErrorReporter;
use crate::results::{DbRow, ResultSet};
use crate::stats::{ExecutionRecord, StatsBuffer};
use crate::template::{self, PreparedTemplate};
use crate::types::{SetPayload, SqlArg, SqlValue};

/// Guarded access to one database over one connection.
pub struct Database<C: Connector> {
    lifecycle: ConnectionManager<C>,
    reporter: ErrorReporter,
    stats: StatsBuffer,
    stats_enabled: bool,
    in_transaction: bool,
    retries: u64,
    last_query: Option<String>,
    last_error: Option<String>,
    last_insert_id: i64,
    affected_rows: usize,
}

impl<C: Connector> Database<C> {
    /// Create with default [`ManagerOptions`]. No connection is opened yet.
    #[must_use]
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self::with_options(connector, config, ManagerOptions::default())
    }

    #[must_use]
    pub fn with_options(connector: C, config: ConnectionConfig, options: ManagerOptions) -> Self {
        Self {
            lifecycle: ConnectionManager::new(connector, config, &options),
            reporter: ErrorReporter::default(),
            stats: StatsBuffer::new(options.stats_capacity),
            stats_enabled: options.stats_enabled,
            in_transaction: false,
            retries: 0,
            last_query: None,
            last_error: None,
            last_insert_id: 0,
            affected_rows: 0,
        }
    }

    /// Open the connection now instead of on first use.
    ///
    /// # Errors
    /// Returns `SqlGuardError::ConnectError` once every connect attempt has failed.
    pub fn connect(&mut self) -> Result<(), SqlGuardError> {
        match self.lifecycle.acquire() {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Close the connection. The next statement reconnects.
    pub fn disconnect(&mut self) {
        if self.in_transaction {
            tracing::warn!("disconnecting with an open transaction; it will be rolled back by the server");
            self.in_transaction = false;
        }
        self.lifecycle.disconnect();
    }

    /// Quoting rules of the connector's backend.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.lifecycle.dialect()
    }

    /// Substitute `args` into `template` without touching the connection. String literals are
    /// quoted for this database's [`dialect`](Self::dialect).
    ///
    /// # Errors
    /// See [`template::compile`].
    pub fn compile(&self, template: &str, args: &[SqlArg]) -> Result<String, SqlGuardError> {
        template::compile_with(self.dialect(), template, args)
    }

    /// Same as [`compile`](Self::compile).
    ///
    /// # Errors
    /// See [`template::compile`].
    pub fn parse(&self, template: &str, args: &[SqlArg]) -> Result<String, SqlGuardError> {
        self.compile(template, args)
    }

    /// Compile `template` and execute the result.
    ///
    /// # Errors
    /// Validation errors come back before any I/O; connect and query errors also go to the
    /// error hook.
    pub fn query(&mut self, template: &str, args: &[SqlArg]) -> Result<ResultSet, SqlGuardError> {
        let sql = self.compile(template, args)?;
        self.execute(&sql)
    }

    /// Scan `template` once for repeated use with [`execute_prepared`](Self::execute_prepared).
    #[must_use]
    pub fn prepare(&self, template: &str) -> PreparedTemplate {
        PreparedTemplate::new(template)
    }

    /// # Errors
    /// Same as [`query`](Self::query).
    pub fn execute_prepared(
        &mut self,
        prepared: &PreparedTemplate,
        args: &[SqlArg],
    ) -> Result<ResultSet, SqlGuardError> {
        let sql = prepared.compile_with(self.dialect(), args)?;
        self.execute(&sql)
    }

    /// Run already-compiled SQL.
    ///
    /// Verifies the connection first. If the server reports that the connection went away
    /// (2006) or was lost mid-statement (2013), the connection is replaced and the statement
    /// is submitted exactly once more. Other errors, and any loss inside an open transaction,
    /// are returned without a retry.
    ///
    /// # Errors
    /// `EmptyQueryError` for blank input; otherwise `ConnectError` or `QueryError`, both of
    /// which are also passed to the error hook.
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet, SqlGuardError> {
        if sql.trim().is_empty() {
            return Err(SqlGuardError::EmptyQueryError);
        }
        self.last_query = Some(sql.to_string());

        match self.run(sql) {
            Ok(result_set) => {
                self.lifecycle.touch();
                self.last_error = None;
                self.affected_rows = result_set.rows_affected;
                if let Some(conn) = self.lifecycle.current() {
                    self.last_insert_id = conn.last_insert_id();
                }
                Ok(result_set)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Build and run `INSERT INTO [db.]table SET ...`, or the `(cols) VALUES (...)` form on
    /// backends without the `SET` syntax.
    ///
    /// # Errors
    /// `EmptyPayloadError` for an empty payload, otherwise as [`query`](Self::query).
    pub fn insert(
        &mut self,
        table: &str,
        payload: SetPayload,
        db_name: Option<&str>,
    ) -> Result<ResultSet, SqlGuardError> {
        let dialect = self.dialect();
        let (target, mut args) = qualified_table(table, db_name);
        if dialect.supports_insert_set() {
            args.push(SqlArg::Set(payload));
            return self.query(&format!("INSERT INTO {target} SET ?u"), &args);
        }
        args.push(SqlArg::raw(escape_insert_values(dialect, &payload)?));
        self.query(&format!("INSERT INTO {target} ?p"), &args)
    }

    /// Build and run `UPDATE [db.]table SET ... [WHERE ...]`.
    ///
    /// `where_clause` is inserted verbatim; build it with [`compile`](Self::compile) when it
    /// carries values.
    ///
    /// # Errors
    /// `EmptyPayloadError` for an empty payload, otherwise as [`query`](Self::query).
    pub fn update(
        &mut self,
        table: &str,
        payload: SetPayload,
        where_clause: Option<&str>,
        db_name: Option<&str>,
    ) -> Result<ResultSet, SqlGuardError> {
        let (target, mut args) = qualified_table(table, db_name);
        args.push(SqlArg::Set(payload));
        let mut template = format!("UPDATE {target} SET ?u");
        if let Some(clause) = where_clause.map(str::trim).filter(|c| !c.is_empty()) {
            template.push_str(" WHERE ?p");
            args.push(SqlArg::raw(clause));
        }
        self.query(&template, &args)
    }

    /// First column of the first row, or `None` when the query returns no rows.
    ///
    /// # Errors
    /// Same as [`query`](Self::query).
    pub fn get_one(
        &mut self,
        template: &str,
        args: &[SqlArg],
    ) -> Result<Option<SqlValue>, SqlGuardError> {
        let result_set = self.query(template, args)?;
        Ok(result_set.first_value().cloned())
    }

    /// First row, or `None` when the query returns no rows.
    ///
    /// # Errors
    /// Same as [`query`](Self::query).
    pub fn get_row(
        &mut self,
        template: &str,
        args: &[SqlArg],
    ) -> Result<Option<DbRow>, SqlGuardError> {
        let result_set = self.query(template, args)?;
        Ok(result_set.results.into_iter().next())
    }

    /// First column of every row.
    ///
    /// # Errors
    /// Same as [`query`](Self::query).
    pub fn get_col(
        &mut self,
        template: &str,
        args: &[SqlArg],
    ) -> Result<Vec<SqlValue>, SqlGuardError> {
        let result_set = self.query(template, args)?;
        Ok(result_set
            .results
            .into_iter()
            .filter_map(|row| row.values.into_iter().next())
            .collect())
    }

    /// Every row.
    ///
    /// # Errors
    /// Same as [`query`](Self::query).
    pub fn get_all(
        &mut self,
        template: &str,
        args: &[SqlArg],
    ) -> Result<Vec<DbRow>, SqlGuardError> {
        Ok(self.query(template, args)?.results)
    }

    /// Rows keyed by the text of column `index`, in first-seen order. A repeated key replaces
    /// the earlier row in place.
    ///
    /// # Errors
    /// `TypeError` if the result has rows but no `index` column, otherwise as
    /// [`query`](Self::query).
    pub fn get_ind(
        &mut self,
        index: &str,
        template: &str,
        args: &[SqlArg],
    ) -> Result<Vec<(String, DbRow)>, SqlGuardError> {
        let result_set = self.query(template, args)?;
        let mut keyed = KeyedRows::default();
        for row in result_set.results {
            let key = index_key(&row, index)?;
            keyed.put(key, row);
        }
        Ok(keyed.entries)
    }

    /// `key => value` pairs: the key is column `index`, the value is the first other column.
    /// Ordering and duplicate keys behave as in [`get_ind`](Self::get_ind).
    ///
    /// # Errors
    /// Same as [`get_ind`](Self::get_ind).
    pub fn get_ind_col(
        &mut self,
        index: &str,
        template: &str,
        args: &[SqlArg],
    ) -> Result<Vec<(String, SqlValue)>, SqlGuardError> {
        let result_set = self.query(template, args)?;
        let mut keyed = KeyedRows::default();
        for row in result_set.results {
            let key = index_key(&row, index)?;
            let value = row
                .column_names
                .iter()
                .position(|name| name != index)
                .and_then(|idx| row.values.get(idx).cloned())
                .unwrap_or(SqlValue::Null);
            keyed.put(key, value);
        }
        Ok(keyed.entries)
    }

    /// # Errors
    /// `TransactionError` if one is already open; `ConnectError` or `QueryError` otherwise.
    pub fn begin_transaction(&mut self) -> Result<(), SqlGuardError> {
        if self.in_transaction {
            return Err(SqlGuardError::TransactionError("transaction already open".into()));
        }
        let outcome = self
            .lifecycle
            .acquire()
            .and_then(|conn| conn.begin().map_err(|err| SqlGuardError::query(&err)));
        match outcome {
            Ok(()) => {
                self.in_transaction = true;
                self.lifecycle.touch();
                tracing::debug!("transaction started");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// # Errors
    /// `TransactionError` without an open transaction or after the connection was lost;
    /// `QueryError` if the server rejects the commit.
    pub fn commit(&mut self) -> Result<(), SqlGuardError> {
        self.finish_transaction(true)
    }

    /// # Errors
    /// `TransactionError` without an open transaction or after the connection was lost;
    /// `QueryError` if the server rejects the rollback.
    pub fn rollback(&mut self) -> Result<(), SqlGuardError> {
        self.finish_transaction(false)
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lifecycle.is_connected()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        self.lifecycle.config()
    }

    #[must_use]
    pub fn counters(&self) -> LifecycleCounters {
        self.lifecycle.counters()
    }

    /// Statements that were resubmitted after a connection loss.
    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries
    }

    #[must_use]
    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    /// Text of the most recent connect or query failure; cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    #[must_use]
    pub fn affected_rows(&self) -> usize {
        self.affected_rows
    }

    /// Recorded executions, oldest first.
    #[must_use]
    pub fn stats(&self) -> Vec<ExecutionRecord> {
        self.stats.to_vec()
    }

    #[must_use]
    pub fn stats_buffer(&self) -> &StatsBuffer {
        &self.stats
    }

    /// Stop or resume recording. Existing records are kept.
    pub fn set_stats_enabled(&mut self, enabled: bool) {
        self.stats_enabled = enabled;
    }

    #[must_use]
    pub fn stats_enabled(&self) -> bool {
        self.stats_enabled
    }

    /// Shrinking drops the oldest records.
    pub fn set_stats_capacity(&mut self, capacity: usize) {
        self.stats.set_capacity(capacity);
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    pub fn set_idle_threshold(&mut self, idle_threshold: Duration) {
        self.lifecycle.set_idle_threshold(idle_threshold);
    }

    pub fn set_reconnect_policy(&mut self, attempts: u32, backoff: Duration) {
        self.lifecycle.set_reconnect_policy(attempts, backoff);
    }

    /// Replace the default handler, which logs through `tracing` at error level.
    pub fn set_error_handler(&mut self, handler: impl FnMut(&str) + Send + 'static) {
        self.reporter.set_handler(Box::new(handler));
    }

    pub fn clear_error_handler(&mut self) {
        self.reporter.clear_handler();
    }

    fn run(&mut self, sql: &str) -> Result<ResultSet, SqlGuardError> {
        let in_transaction = self.in_transaction;
        let conn = if in_transaction {
            self.lifecycle.current_mut().ok_or_else(lost_in_transaction)?
        } else {
            self.lifecycle.acquire()?
        };

        let started_at = Utc::now();
        let timer = Instant::now();
        let outcome = match conn.execute(sql) {
            Ok(result_set) => Ok(result_set),
            Err(err) if err.is_connection_lost() && !in_transaction => {
                tracing::warn!(code = err.code, error = %err.message, "connection lost; reconnecting to retry once");
                self.retries += 1;
                self.lifecycle
                    .force_reconnect()
                    .and_then(|conn| conn.execute(sql).map_err(|err| SqlGuardError::query(&err)))
            }
            Err(err) => {
                if err.is_connection_lost() {
                    tracing::warn!(code = err.code, "connection lost inside a transaction; not retrying");
                    self.in_transaction = false;
                    self.lifecycle.disconnect();
                }
                Err(SqlGuardError::query(&err))
            }
        };

        self.record(sql, started_at, timer.elapsed(), &outcome);
        outcome
    }

    fn finish_transaction(&mut self, commit: bool) -> Result<(), SqlGuardError> {
        let verb = if commit { "commit" } else { "rollback" };
        if !self.in_transaction {
            return Err(SqlGuardError::TransactionError(format!("{verb} without an open transaction")));
        }
        self.in_transaction = false;

        let Some(conn) = self.lifecycle.current_mut() else {
            return Err(self.fail(lost_in_transaction()));
        };
        let outcome = if commit { conn.commit() } else { conn.rollback() };
        match outcome {
            Ok(()) => {
                self.lifecycle.touch();
                tracing::debug!("transaction {verb} complete");
                Ok(())
            }
            Err(err) => {
                if err.is_connection_lost() {
                    self.lifecycle.disconnect();
                }
                Err(self.fail(SqlGuardError::query(&err)))
            }
        }
    }

    fn record(
        &mut self,
        sql: &str,
        started_at: DateTime<Utc>,
        duration: Duration,
        outcome: &Result<ResultSet, SqlGuardError>,
    ) {
        if !self.stats_enabled {
            return;
        }
        let (rows, error) = match outcome {
            Ok(result_set) => (result_set.rows_affected, None),
            Err(err) => (0, Some(err.to_string())),
        };
        self.stats.push(ExecutionRecord {
            sql: sql.to_string(),
            started_at,
            duration,
            rows,
            error,
        });
    }

    /// Remember and report connect, query and transaction failures, then hand the error back.
    fn fail(&mut self, err: SqlGuardError) -> SqlGuardError {
        if !err.is_validation() {
            let message = err.to_string();
            self.reporter.report(&message);
            self.last_error = Some(message);
        }
        err
    }
}

fn lost_in_transaction() -> SqlGuardError {
    SqlGuardError::TransactionError("connection lost during transaction".into())
}

struct KeyedRows<T> {
    entries: Vec<(String, T)>,
    positions: HashMap<String, usize>,
}

impl<T> Default for KeyedRows<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T> KeyedRows<T> {
    fn put(&mut self, key: String, value: T) {
        if let Some(&pos) = self.positions.get(&key) {
            self.entries[pos].1 = value;
        } else {
            self.positions.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }
}

fn index_key(row: &DbRow, index: &str) -> Result<String, SqlGuardError> {
    let value = row
        .get(index)
        .ok_or_else(|| {
            SqlGuardError::TypeError(format!("index column {index} is not in the result"))
        })?;
    Ok(match value {
        SqlValue::Null => String::new(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
        SqlValue::Timestamp(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        SqlValue::Json(json) => json.to_string(),
        SqlValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    })
}

fn qualified_table(table: &str, db_name: Option<&str>) -> (String, Vec<SqlArg>) {
    match db_name {
        Some(db) => ("?n.?n".to_string(), vec![SqlArg::from(db), SqlArg::from(table)]),
        None => ("?n".to_string(), vec![SqlArg::from(table)]),
    }
}

impl<C: Connector> fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("lifecycle", &self.lifecycle)
            .field("reporter", &self.reporter)
            .field("stats_enabled", &self.stats_enabled)
            .field("stats_len", &self.stats.len())
            .field("in_transaction", &self.in_transaction)
            .field("last_query", &self.last_query)
            .finish_non_exhaustive()
    }
}
