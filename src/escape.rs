//! Escaping rules for each placeholder kind.
//!
//! Every function here is pure: it turns a typed value into a SQL fragment that can be spliced
//! into a statement as-is. How string literals are quoted depends on the backend's [`Dialect`].

use std::fmt::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlGuardError;
use crate::types::{SetPayload, SetValue, SqlValue};

/// Largest magnitude a float can have while every integer below it is exact.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// String literal rules of the backend a statement is compiled for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Backslash escapes, as `mysql_real_escape_string` produces them
    #[default]
    MySql,
    /// Standard SQL: a quote is doubled and a backslash is an ordinary character
    Sqlite,
}

impl Dialect {
    /// Wrap raw text in a single-quoted literal this backend reads back verbatim.
    #[must_use]
    pub fn quote_str(self, s: &str) -> String {
        match self {
            Self::MySql => quote_mysql(s),
            Self::Sqlite => quote_sqlite(s),
        }
    }

    /// Leading keywords of an `INSERT`, optionally skipping rows that hit a unique key.
    #[must_use]
    pub fn insert_keyword(self, ignore: bool) -> &'static str {
        match (self, ignore) {
            (_, false) => "INSERT INTO",
            (Self::MySql, true) => "INSERT IGNORE INTO",
            (Self::Sqlite, true) => "INSERT OR IGNORE INTO",
        }
    }

    /// Whether `INSERT INTO t SET col=value` is accepted.
    #[must_use]
    pub fn supports_insert_set(self) -> bool {
        matches!(self, Self::MySql)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        })
    }
}

impl FromStr for Dialect {
    type Err = SqlGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(SqlGuardError::ConfigError(format!("unknown dialect: {other}"))),
        }
    }
}

fn quote_mysql(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn quote_sqlite(s: &str) -> String {
    // A NUL ends the statement text for sqlite3_prepare, so such strings go in as hex.
    if s.contains('\0') {
        return format!("CAST(X'{}' AS TEXT)", hex::encode_upper(s));
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Quote an identifier with backticks, doubling any embedded backtick.
///
/// Only the empty name is rejected; `"0"` is an ordinary column name.
///
/// # Errors
/// Returns `SqlGuardError::EmptyIdentifierError` for an empty name.
pub fn escape_ident(name: &str) -> Result<String, SqlGuardError> {
    if name.is_empty() {
        return Err(SqlGuardError::EmptyIdentifierError);
    }
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for c in name.chars() {
        if c == '`' {
            out.push('`');
        }
        out.push(c);
    }
    out.push('`');
    Ok(out)
}

/// Escape any scalar as a string literal (`?s`). `Null` becomes the bare keyword `NULL`.
#[must_use]
pub fn escape_string(dialect: Dialect, value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Int(i) => dialect.quote_str(&i.to_string()),
        SqlValue::Float(f) => dialect.quote_str(&f.to_string()),
        SqlValue::Text(s) => dialect.quote_str(s),
        SqlValue::Bool(b) => dialect.quote_str(if *b { "1" } else { "0" }),
        SqlValue::Timestamp(dt) => {
            dialect.quote_str(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        SqlValue::Json(json) => dialect.quote_str(&json.to_string()),
        SqlValue::Blob(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            let _ = write!(out, "X'{}'", hex::encode_upper(bytes));
            out
        }
    }
}

/// Escape a numeric value (`?i`).
///
/// Floats are rounded half away from zero. Values whose integer form cannot be represented
/// exactly fall back to a quoted literal in exponent notation so nothing is silently truncated.
///
/// # Errors
/// Returns `SqlGuardError::TypeError` for non-numeric input.
pub fn escape_int(dialect: Dialect, value: &SqlValue) -> Result<String, SqlGuardError> {
    match value {
        SqlValue::Null => Ok("NULL".to_string()),
        SqlValue::Int(i) => Ok(i.to_string()),
        SqlValue::Float(f) => float_to_int_literal(dialect, *f, || format!("{f:e}")),
        SqlValue::Text(s) => numeric_text_to_literal(dialect, s),
        other => Err(not_numeric(other.type_name())),
    }
}

fn float_to_int_literal(
    dialect: Dialect,
    f: f64,
    exponent_form: impl FnOnce() -> String,
) -> Result<String, SqlGuardError> {
    if !f.is_finite() {
        return Err(not_numeric("non-finite float"));
    }
    let rounded = f.round();
    if rounded.abs() >= MAX_EXACT_FLOAT_INT {
        return Ok(dialect.quote_str(&exponent_form()));
    }
    Ok((rounded as i64).to_string())
}

fn numeric_text_to_literal(dialect: Dialect, s: &str) -> Result<String, SqlGuardError> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(i.to_string());
    }
    if is_plain_integer(s) {
        // Out of i64 range but still a bare digit string: keep every digit.
        return Ok(s.trim_start_matches('+').to_string());
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            if s.contains(['e', 'E']) {
                Ok(dialect.quote_str(s))
            } else {
                float_to_int_literal(dialect, f, || s.to_string())
            }
        }
        _ => Err(not_numeric("text")),
    }
}

fn is_plain_integer(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn not_numeric(given: &str) -> SqlGuardError {
    SqlGuardError::TypeError(format!(
        "Integer (?i) placeholder expects numeric value, {given} given"
    ))
}

/// Escape a value by its own type: integers stay bare, everything else is a string literal.
#[must_use]
pub fn escape_literal(dialect: Dialect, value: &SqlValue) -> String {
    match value {
        SqlValue::Int(i) => i.to_string(),
        other => escape_string(dialect, other),
    }
}

/// Comma-join a list of literals for `IN (?a)`. An empty list becomes `NULL`.
#[must_use]
pub fn escape_list(dialect: Dialect, values: &[SqlValue]) -> String {
    if values.is_empty() {
        return "NULL".to_string();
    }
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_literal(dialect, value));
    }
    out
}

/// Render `` `col`=value `` pairs for `SET ?u`, preserving payload order.
///
/// # Errors
/// Returns `SqlGuardError::EmptyPayloadError` for an empty payload and
/// `SqlGuardError::EmptyIdentifierError` for an empty column name.
pub fn escape_set(dialect: Dialect, payload: &SetPayload) -> Result<String, SqlGuardError> {
    if payload.is_empty() {
        return Err(SqlGuardError::EmptyPayloadError);
    }
    let mut out = String::new();
    for (i, (column, value)) in payload.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_ident(column)?);
        out.push('=');
        match value {
            SetValue::Escaped(value) => out.push_str(&escape_literal(dialect, value)),
            SetValue::Raw(sql) => out.push_str(sql),
        }
    }
    Ok(out)
}

/// Render `` (`a`,`b`) VALUES (x,y) `` from a payload, for backends without `INSERT ... SET`.
///
/// # Errors
/// Same as [`escape_set`].
pub fn escape_insert_values(
    dialect: Dialect,
    payload: &SetPayload,
) -> Result<String, SqlGuardError> {
    if payload.is_empty() {
        return Err(SqlGuardError::EmptyPayloadError);
    }
    let mut columns = String::new();
    let mut values = String::new();
    for (i, (column, value)) in payload.iter().enumerate() {
        if i > 0 {
            columns.push(',');
            values.push(',');
        }
        columns.push_str(&escape_ident(column)?);
        match value {
            SetValue::Escaped(value) => values.push_str(&escape_literal(dialect, value)),
            SetValue::Raw(sql) => values.push_str(sql),
        }
    }
    Ok(format!("({columns}) VALUES ({values})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const MY: Dialect = Dialect::MySql;
    const LITE: Dialect = Dialect::Sqlite;

    #[test]
    fn ident_doubles_backticks() -> Result<(), SqlGuardError> {
        assert_eq!(escape_ident("users")?, "`users`");
        assert_eq!(escape_ident("we`ird")?, "`we``ird`");
        Ok(())
    }

    #[test]
    fn ident_zero_is_a_name() -> Result<(), SqlGuardError> {
        assert_eq!(escape_ident("0")?, "`0`");
        Ok(())
    }

    #[test]
    fn ident_rejects_empty() {
        assert!(matches!(
            escape_ident(""),
            Err(SqlGuardError::EmptyIdentifierError)
        ));
    }

    #[test]
    fn ident_with_quote_unescapes_to_original() -> Result<(), SqlGuardError> {
        let original = "a`b``c";
        let quoted = escape_ident(original)?;
        let inner = &quoted[1..quoted.len() - 1];
        assert!(!inner.replace("``", "").contains('`'));
        assert_eq!(inner.replace("``", "`"), original);
        Ok(())
    }

    #[test]
    fn string_escapes_special_characters() {
        let value = SqlValue::Text("it's \"x\"\n\\ \0 \x1a".into());
        assert_eq!(
            escape_string(MY, &value),
            r#"'it\'s \"x\"\n\\ \0 \Z'"#
        );
    }

    #[test]
    fn string_of_scalars() {
        assert_eq!(escape_string(MY, &SqlValue::Null), "NULL");
        assert_eq!(escape_string(MY, &SqlValue::Int(7)), "'7'");
        assert_eq!(escape_string(MY, &SqlValue::Float(2.5)), "'2.5'");
        assert_eq!(escape_string(MY, &SqlValue::Bool(true)), "'1'");
        assert_eq!(escape_string(MY, &SqlValue::Blob(vec![0xde, 0xad])), "X'DEAD'");
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .expect("valid timestamp");
        assert_eq!(escape_string(MY, &SqlValue::Timestamp(ts)), "'2024-01-02 03:04:05'");
        assert_eq!(
            escape_string(MY, &SqlValue::Json(serde_json::json!({"k": "v"}))),
            r#"'{\"k\":\"v\"}'"#
        );
    }

    #[test]
    fn int_of_null_float_and_text() -> Result<(), SqlGuardError> {
        assert_eq!(escape_int(MY, &SqlValue::Null)?, "NULL");
        assert_eq!(escape_int(MY, &SqlValue::Float(3.0))?, "3");
        assert_eq!(escape_int(MY, &SqlValue::Float(2.5))?, "3");
        assert_eq!(escape_int(MY, &SqlValue::Float(-0.4))?, "0");
        assert_eq!(escape_int(MY, &SqlValue::Text("42".into()))?, "42");
        assert_eq!(escape_int(MY, &SqlValue::Text("3.7".into()))?, "4");
        assert_eq!(
            escape_int(MY, &SqlValue::Text("123456789012345678901234".into()))?,
            "123456789012345678901234"
        );
        Ok(())
    }

    #[test]
    fn int_exponent_falls_back_to_string() -> Result<(), SqlGuardError> {
        assert_eq!(escape_int(MY, &SqlValue::Text("1e5".into()))?, "'1e5'");
        assert_eq!(escape_int(MY, &SqlValue::Float(1e20))?, "'1e20'");
        Ok(())
    }

    #[test]
    fn int_rejects_non_numeric() {
        for value in [
            SqlValue::Text("abc".into()),
            SqlValue::Text("NaN".into()),
            SqlValue::Float(f64::INFINITY),
            SqlValue::Bool(true),
            SqlValue::Blob(vec![1]),
        ] {
            assert!(
                matches!(escape_int(MY, &value), Err(SqlGuardError::TypeError(_))),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn list_mixes_ints_and_strings() {
        assert_eq!(escape_list(MY, &[]), "NULL");
        assert_eq!(
            escape_list(MY, &[SqlValue::Int(1), SqlValue::Text("a".into())]),
            "1,'a'"
        );
        assert_eq!(escape_list(MY, &[SqlValue::Null, SqlValue::Float(1.5)]), "NULL,'1.5'");
    }

    #[test]
    fn set_preserves_order_and_passes_raw() -> Result<(), SqlGuardError> {
        let payload = SetPayload::new().set("id", 5).set("name", "x");
        assert_eq!(escape_set(MY, &payload)?, "`id`=5,`name`='x'");

        let payload = SetPayload::new().raw("date", "NOW()").set("n", "o'k");
        assert_eq!(escape_set(MY, &payload)?, "`date`=NOW(),`n`='o\\'k'");
        Ok(())
    }

    #[test]
    fn set_rejects_empty_payload() {
        assert!(matches!(
            escape_set(MY, &SetPayload::new()),
            Err(SqlGuardError::EmptyPayloadError)
        ));
    }

    #[test]
    fn sqlite_doubles_quotes_and_keeps_backslashes() {
        assert_eq!(LITE.quote_str("O'Brien"), "'O''Brien'");
        assert_eq!(LITE.quote_str("' OR 1=1 -- "), "''' OR 1=1 -- '");
        assert_eq!(LITE.quote_str(r"a\'b"), r"'a\''b'");
        assert_eq!(LITE.quote_str("line\nbreak \"q\""), "'line\nbreak \"q\"'");
    }

    #[test]
    fn sqlite_backslash_cannot_close_the_literal() {
        let hostile = r"\' OR '1'='1";
        let quoted = LITE.quote_str(hostile);
        let inner = &quoted[1..quoted.len() - 1];
        assert!(!inner.replace("''", "").contains('\''));
        assert_eq!(inner.replace("''", "'"), hostile);
    }

    #[test]
    fn sqlite_nul_goes_in_as_hex() {
        assert_eq!(LITE.quote_str("a\0b"), "CAST(X'610062' AS TEXT)");
    }

    #[test]
    fn dialect_flows_through_every_escaper() -> Result<(), SqlGuardError> {
        let text = SqlValue::Text("it's".into());
        assert_eq!(escape_string(LITE, &text), "'it''s'");
        assert_eq!(escape_list(LITE, &[SqlValue::Int(1), text.clone()]), "1,'it''s'");
        let payload = SetPayload::new().set("n", "o'k");
        assert_eq!(escape_set(LITE, &payload)?, "`n`='o''k'");
        assert_eq!(escape_int(LITE, &SqlValue::Text("1e5".into()))?, "'1e5'");
        Ok(())
    }

    #[test]
    fn insert_values_follow_payload_order() -> Result<(), SqlGuardError> {
        let payload = SetPayload::new()
            .set("name", "O'Brien")
            .raw("seen", "CURRENT_TIMESTAMP")
            .set("n", 2);
        assert_eq!(
            escape_insert_values(LITE, &payload)?,
            "(`name`,`seen`,`n`) VALUES ('O''Brien',CURRENT_TIMESTAMP,2)"
        );
        assert!(matches!(
            escape_insert_values(LITE, &SetPayload::new()),
            Err(SqlGuardError::EmptyPayloadError)
        ));
        assert_eq!(LITE.insert_keyword(true), "INSERT OR IGNORE INTO");
        assert_eq!(MY.insert_keyword(true), "INSERT IGNORE INTO");
        assert_eq!(MY.insert_keyword(false), "INSERT INTO");
        Ok(())
    }

    #[test]
    fn dialect_names_parse() -> Result<(), SqlGuardError> {
        assert_eq!("sqlite".parse::<Dialect>()?, Dialect::Sqlite);
        assert_eq!("MySQL".parse::<Dialect>()?, Dialect::MySql);
        assert_eq!(Dialect::default(), Dialect::MySql);
        assert!("oracle".parse::<Dialect>().is_err());
        Ok(())
    }
}
