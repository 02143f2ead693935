use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::types::SqlValue;

/// A row from a query result.
///
/// Column names and the name→index map are shared by every row of the same result set.
#[derive(Debug, Clone)]
pub struct DbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<SqlValue>,
    column_index: Arc<HashMap<String, usize>>,
}

impl DbRow {
    /// Create a row, building its own column index.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index,
        }
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index.get(column_name).copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

fn value_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Int(i) => serde_json::Value::from(*i),
        SqlValue::Float(f) => serde_json::Value::from(*f),
        SqlValue::Text(s) => serde_json::Value::from(s.as_str()),
        SqlValue::Bool(b) => serde_json::Value::from(*b),
        SqlValue::Timestamp(dt) => serde_json::Value::from(dt.format("%F %T%.f").to_string()),
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Json(json) => json.clone(),
        SqlValue::Blob(bytes) => serde_json::Value::from(hex::encode(bytes)),
    }
}

/// Serializes as a `{column: value}` object in column order.
impl Serialize for DbRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.column_names.iter().zip(&self.values) {
            map.serialize_entry(name, &value_to_json(value))?;
        }
        map.end()
    }
}
