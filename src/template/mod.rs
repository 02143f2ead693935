mod scanner;

use scanner::{Segment, count, scan};

pub use scanner::Placeholder;

use crate::error::SqlGuardError;
use crate::escape::{Dialect, escape_ident, escape_int, escape_list, escape_set, escape_string};
use crate::types::{SqlArg, SqlValue};

/// Build a `Vec<SqlArg>` from heterogeneous values.
///
/// ```rust
/// use sql_guard::prelude::*;
///
/// let sql = compile("SELECT * FROM ?n WHERE id IN (?a) AND name=?s", &sql_args!["users", vec![1, 2], "bob"])?;
/// assert_eq!(sql, "SELECT * FROM `users` WHERE id IN (1,2) AND name='bob'");
/// # Ok::<(), SqlGuardError>(())
/// ```
#[macro_export]
macro_rules! sql_args {
    () => {
        ::std::vec::Vec::<$crate::SqlArg>::new()
    };
    ($($arg:expr),+ $(,)?) => {{
        let args: ::std::vec::Vec<$crate::SqlArg> = vec![$($crate::SqlArg::from($arg)),+];
        args
    }};
}

/// Substitute `args` into `template`, escaping each according to its placeholder.
///
/// String literals are quoted for MySQL; use [`compile_with`] for another backend.
///
/// Supported placeholders: `?n` identifier, `?s` string, `?i` integer, `?a` list, `?u` SET
/// payload, `?p` raw SQL. The argument count must equal the placeholder count exactly.
///
/// Warning: the scan does not understand quoting, so the two-character tokens are recognized
/// even inside string literals written directly in the template. Pass such text through `?s`
/// instead of embedding it.
///
/// # Errors
/// Returns `SqlGuardError::ArityError` on a count mismatch, and `TypeError`,
/// `EmptyIdentifierError` or `EmptyPayloadError` when an argument does not fit its placeholder.
pub fn compile(template: &str, args: &[SqlArg]) -> Result<String, SqlGuardError> {
    compile_with(Dialect::MySql, template, args)
}

/// [`compile`] with string literals quoted for `dialect`.
///
/// # Errors
/// Same as [`compile`].
pub fn compile_with(
    dialect: Dialect,
    template: &str,
    args: &[SqlArg],
) -> Result<String, SqlGuardError> {
    let segments = scan(template);
    assemble(dialect, template, &segments, args)
}

/// Number of placeholder tokens in `template`.
#[must_use]
pub fn count_placeholders(template: &str) -> usize {
    count(&scan(template))
}

/// A template scanned once and compiled many times.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    template: String,
    segments: Vec<Segment>,
}

impl PreparedTemplate {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let segments = scan(&template);
        Self { template, segments }
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder kinds in the order arguments must be supplied.
    #[must_use]
    pub fn placeholders(&self) -> Vec<Placeholder> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(kind) => Some(*kind),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        count(&self.segments)
    }

    /// Compile with a fresh set of arguments.
    ///
    /// # Errors
    /// Same as [`compile`].
    pub fn compile(&self, args: &[SqlArg]) -> Result<String, SqlGuardError> {
        self.compile_with(Dialect::MySql, args)
    }

    /// # Errors
    /// Same as [`compile`].
    pub fn compile_with(&self, dialect: Dialect, args: &[SqlArg]) -> Result<String, SqlGuardError> {
        assemble(dialect, &self.template, &self.segments, args)
    }
}

fn assemble(
    dialect: Dialect,
    template: &str,
    segments: &[Segment],
    args: &[SqlArg],
) -> Result<String, SqlGuardError> {
    let placeholders = count(segments);
    if placeholders != args.len() {
        return Err(SqlGuardError::ArityError {
            placeholders,
            args: args.len(),
            template: template.to_string(),
        });
    }

    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut args = args.iter();
    for segment in segments {
        match segment {
            Segment::Literal(range) => out.push_str(&template[range.clone()]),
            Segment::Placeholder(kind) => {
                // Arity was checked above, so every placeholder has an argument.
                let Some(arg) = args.next() else { break };
                out.push_str(&render(dialect, *kind, arg)?);
            }
        }
    }
    Ok(out)
}

fn render(dialect: Dialect, kind: Placeholder, arg: &SqlArg) -> Result<String, SqlGuardError> {
    match (kind, arg) {
        (Placeholder::Ident, SqlArg::Value(SqlValue::Text(name))) => escape_ident(name),
        (Placeholder::Ident, SqlArg::Value(SqlValue::Null)) => {
            Err(SqlGuardError::EmptyIdentifierError)
        }
        (Placeholder::Str, SqlArg::Value(value)) => Ok(escape_string(dialect, value)),
        (Placeholder::Int, SqlArg::Value(value)) => escape_int(dialect, value),
        (Placeholder::List, SqlArg::List(values)) => Ok(escape_list(dialect, values)),
        (Placeholder::Set, SqlArg::Set(payload)) => escape_set(dialect, payload),
        (Placeholder::Raw, SqlArg::Value(SqlValue::Text(sql))) => Ok(sql.clone()),
        (Placeholder::Raw, SqlArg::Value(SqlValue::Null)) => Ok(String::new()),
        (kind, other) => Err(mismatch(kind, other)),
    }
}

fn mismatch(kind: Placeholder, arg: &SqlArg) -> SqlGuardError {
    let expected = match kind {
        Placeholder::Ident => "Identifier (?n) placeholder expects text",
        Placeholder::Str => "String (?s) placeholder expects a scalar",
        Placeholder::Int => "Integer (?i) placeholder expects numeric value",
        Placeholder::List => "Value for IN (?a) placeholder should be a list",
        Placeholder::Set => "SET (?u) placeholder expects a set payload",
        Placeholder::Raw => "Raw (?p) placeholder expects SQL text",
    };
    SqlGuardError::TypeError(format!("{expected}, {} given", arg.type_name()))
}
