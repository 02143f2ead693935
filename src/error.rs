use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum SqlGuardError {
    #[error("Number of args ({args}) doesn't match number of placeholders ({placeholders}) in [{template}]")]
    ArityError {
        placeholders: usize,
        args: usize,
        template: String,
    },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Empty value for identifier (?n) placeholder")]
    EmptyIdentifierError,

    #[error("Empty payload for SET (?u) placeholder")]
    EmptyPayloadError,

    #[error("Empty query")]
    EmptyQueryError,

    #[error("Database connect error: {0}")]
    ConnectError(String),

    #[error("Database query error: {message}")]
    QueryError { code: Option<i64>, message: String },

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

impl SqlGuardError {
    /// Build a `QueryError` carrying the client's native code and text.
    #[must_use]
    pub fn query(err: &ClientError) -> Self {
        SqlGuardError::QueryError {
            code: Some(err.code),
            message: err.message.clone(),
        }
    }

    /// True for caller mistakes caught before any I/O.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SqlGuardError::ArityError { .. }
                | SqlGuardError::TypeError(_)
                | SqlGuardError::EmptyIdentifierError
                | SqlGuardError::EmptyPayloadError
                | SqlGuardError::EmptyQueryError
        )
    }
}
