use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqlGuardError;

/// Scalar values that can be substituted into a template.
///
/// ```rust
/// use sql_guard::prelude::*;
///
/// let values = vec![
///     SqlValue::Int(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::Null,
/// ];
/// # let _ = values;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let SqlValue::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let SqlValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let SqlValue::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let SqlValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bool(_) => "bool",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Null => "null",
            SqlValue::Json(_) => "json",
            SqlValue::Blob(_) => "blob",
        }
    }
}

macro_rules! impl_scalar_conversions {
    ($($t:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$t> for SqlValue {
                fn from(value: $t) -> Self {
                    SqlValue::$variant($conv(value))
                }
            }

            impl From<$t> for SetValue {
                fn from(value: $t) -> Self {
                    SetValue::Escaped(value.into())
                }
            }

            impl From<$t> for SqlArg {
                fn from(value: $t) -> Self {
                    SqlArg::Value(value.into())
                }
            }

            impl From<Option<$t>> for SqlArg {
                fn from(value: Option<$t>) -> Self {
                    SqlArg::Value(value.into())
                }
            }
        )*
    };
}

macro_rules! impl_list_conversions {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<Vec<$t>> for SqlArg {
                fn from(values: Vec<$t>) -> Self {
                    SqlArg::list(values)
                }
            }

            impl From<&[$t]> for SqlArg {
                fn from(values: &[$t]) -> Self {
                    SqlArg::list(values.iter().cloned())
                }
            }
        )*
    };
}

impl_scalar_conversions! {
    i64 => Int via |v| v,
    i32 => Int via i64::from,
    i16 => Int via i64::from,
    u32 => Int via i64::from,
    u16 => Int via i64::from,
    u8 => Int via i64::from,
    f64 => Float via |v| v,
    f32 => Float via f64::from,
    bool => Bool via |v| v,
    String => Text via |v| v,
    &str => Text via str::to_owned,
    NaiveDateTime => Timestamp via |v| v,
    Vec<u8> => Blob via |v| v,
}

// `SqlArg` gets `TryFrom<JsonValue>` instead, so only the scalar sides are direct.
impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        SqlValue::Json(value)
    }
}

impl From<JsonValue> for SetValue {
    fn from(value: JsonValue) -> Self {
        SetValue::Escaped(SqlValue::Json(value))
    }
}

impl_list_conversions!(i64, i32, u32, f64, bool, String, &str, SqlValue);

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Value side of a `?u` assignment.
///
/// `Raw` carries pre-built SQL (e.g. `NOW()`) and is inserted without escaping.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Escaped(SqlValue),
    Raw(String),
}

impl From<SqlValue> for SetValue {
    fn from(value: SqlValue) -> Self {
        SetValue::Escaped(value)
    }
}

/// Ordered `column = value` payload for the `?u` placeholder.
///
/// ```rust
/// use sql_guard::prelude::*;
///
/// let payload = SetPayload::new()
///     .set("name", "Test")
///     .set("value", 123)
///     .raw("date", "NOW()");
/// assert_eq!(payload.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetPayload {
    entries: Vec<(String, SetValue)>,
}

impl SetPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an escaped assignment. Re-setting a column replaces its value in place.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column.into(), SetValue::Escaped(value.into()));
        self
    }

    /// Add an assignment whose value is passed through verbatim.
    #[must_use]
    pub fn raw(mut self, column: impl Into<String>, sql: impl Into<String>) -> Self {
        self.insert(column.into(), SetValue::Raw(sql.into()));
        self
    }

    pub fn insert(&mut self, column: String, value: SetValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.entries.push((column, value));
        }
    }

    /// Keep only the columns accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(name, _)| keep(name));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SetValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<SetValue>> FromIterator<(K, V)> for SetPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = SetPayload::new();
        for (column, value) in iter {
            payload.insert(column.into(), value.into());
        }
        payload
    }
}

/// One template argument.
///
/// Scalars feed `?n`, `?s`, `?i` and `?p`; `List` feeds `?a`; `Set` feeds `?u`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Value(SqlValue),
    List(Vec<SqlValue>),
    Set(SetPayload),
}

impl SqlArg {
    /// Build a `?a` list from any iterator of scalars.
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        SqlArg::List(values.into_iter().map(Into::into).collect())
    }

    /// Raw SQL text for the `?p` placeholder.
    pub fn raw(sql: impl Into<String>) -> Self {
        SqlArg::Value(SqlValue::Text(sql.into()))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlArg::Value(value) => value.type_name(),
            SqlArg::List(_) => "list",
            SqlArg::Set(_) => "set",
        }
    }
}

impl From<SqlValue> for SqlArg {
    fn from(value: SqlValue) -> Self {
        SqlArg::Value(value)
    }
}

impl From<SetPayload> for SqlArg {
    fn from(payload: SetPayload) -> Self {
        SqlArg::Set(payload)
    }
}

/// One list element or payload value. Nesting is rejected: an element of `IN (...)` or the
/// right-hand side of `col=value` has to be a single scalar.
fn json_scalar(value: JsonValue) -> Result<SqlValue, SqlGuardError> {
    match value {
        JsonValue::Null => Ok(SqlValue::Null),
        JsonValue::Bool(b) => Ok(SqlValue::Bool(b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Int(i))
            } else if n.is_u64() {
                // Above i64::MAX: keep the exact digits rather than rounding through f64.
                Ok(SqlValue::Text(n.to_string()))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Float(f))
            } else {
                Err(SqlGuardError::TypeError(format!(
                    "number {n} does not fit a 64-bit value"
                )))
            }
        }
        JsonValue::String(s) => Ok(SqlValue::Text(s)),
        JsonValue::Array(_) => Err(SqlGuardError::TypeError(
            "nested array given where a scalar is expected".into(),
        )),
        JsonValue::Object(_) => Err(SqlGuardError::TypeError(
            "nested object given where a scalar is expected".into(),
        )),
    }
}

/// Arrays become `?a` lists and objects become `?u` payloads (key order preserved).
impl TryFrom<JsonValue> for SqlArg {
    type Error = SqlGuardError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Array(items) => Ok(SqlArg::List(
                items
                    .into_iter()
                    .map(json_scalar)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            JsonValue::Object(map) => {
                let mut payload = SetPayload::new();
                for (column, value) in map {
                    payload.insert(column, SetValue::Escaped(json_scalar(value)?));
                }
                Ok(SqlArg::Set(payload))
            }
            scalar => json_scalar(scalar).map(SqlArg::Value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_none_becomes_null() {
        let value: SqlValue = Option::<i64>::None.into();
        assert!(value.is_null());
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn payload_keeps_insertion_order_and_replaces_in_place() {
        let payload = SetPayload::new()
            .set("id", 5)
            .set("name", "x")
            .set("id", 6);
        let cols: Vec<&str> = payload.iter().map(|(c, _)| c).collect();
        assert_eq!(cols, vec!["id", "name"]);
        assert_eq!(
            payload.iter().next().map(|(_, v)| v.clone()),
            Some(SetValue::Escaped(SqlValue::Int(6)))
        );
    }

    #[test]
    fn json_object_maps_to_ordered_set() -> Result<(), SqlGuardError> {
        let arg = SqlArg::try_from(json!({"zeta": 1, "alpha": "a"}))?;
        let SqlArg::Set(payload) = arg else {
            panic!("expected set payload");
        };
        let cols: Vec<&str> = payload.iter().map(|(c, _)| c).collect();
        assert_eq!(cols, vec!["zeta", "alpha"]);
        Ok(())
    }

    #[test]
    fn json_array_maps_to_list() -> Result<(), SqlGuardError> {
        let arg = SqlArg::try_from(json!([1, "a", null, 2.5]))?;
        assert_eq!(
            arg,
            SqlArg::List(vec![
                SqlValue::Int(1),
                SqlValue::Text("a".into()),
                SqlValue::Null,
                SqlValue::Float(2.5),
            ])
        );
        Ok(())
    }

    #[test]
    fn text_parses_as_timestamp() {
        let value = SqlValue::Text("2024-05-01 10:11:12".into());
        assert!(value.as_timestamp().is_some());
        assert_eq!(SqlValue::Int(1).as_bool(), Some(&true));
    }

    #[test]
    fn json_u64_beyond_i64_keeps_its_digits() -> Result<(), SqlGuardError> {
        let arg = SqlArg::try_from(json!(18_446_744_073_709_551_615u64))?;
        assert_eq!(arg, SqlArg::Value(SqlValue::Text("18446744073709551615".into())));

        let arg = SqlArg::try_from(json!([9_223_372_036_854_775_808u64, 1]))?;
        assert_eq!(
            arg,
            SqlArg::List(vec![
                SqlValue::Text("9223372036854775808".into()),
                SqlValue::Int(1)
            ])
        );
        Ok(())
    }

    #[test]
    fn json_nested_containers_are_type_errors() {
        for value in [
            json!([1, [2, 3]]),
            json!([{"a": 1}]),
            json!({"tags": ["x", "y"]}),
            json!({"meta": {"k": "v"}}),
        ] {
            assert!(
                matches!(SqlArg::try_from(value.clone()), Err(SqlGuardError::TypeError(_))),
                "{value} should be rejected"
            );
        }
    }
}
