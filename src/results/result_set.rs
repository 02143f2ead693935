use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::{DbRow, index_columns};
use crate::types::SqlValue;

/// Rows returned by a statement plus its affected-row count.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<DbRow>,
    /// Rows returned (SELECT) or changed (INSERT/UPDATE/DELETE)
    pub rows_affected: usize,
    #[serde(skip)]
    column_names: Option<Arc<Vec<String>>>,
    #[serde(skip)]
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Result of a statement that returns no rows.
    #[must_use]
    pub fn affected(rows_affected: usize) -> ResultSet {
        ResultSet {
            rows_affected,
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row; ignored until column names are set.
    pub fn add_row_values(&mut self, row_values: Vec<SqlValue>) {
        if let (Some(names), Some(index)) = (&self.column_names, &self.column_index) {
            self.results
                .push(DbRow::with_index(names.clone(), index.clone(), row_values));
            self.rows_affected += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// First column of the first row.
    #[must_use]
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.results.first().and_then(|row| row.get_by_index(0))
    }
}
