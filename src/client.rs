//! Boundary between the manager and a concrete database client.
//!
//! A [`Connector`] opens handles; a [`DbConnection`] is one open handle. Errors carry the
//! client's native code so the executor can tell a dropped connection from a bad statement.

use std::fmt;

use crate::config::ConnectionConfig;
use crate::escape::Dialect;
use crate::results::ResultSet;

/// MySQL client error: "MySQL server has gone away".
pub const CR_SERVER_GONE_ERROR: i64 = 2006;
/// MySQL client error: "Lost connection to MySQL server during query".
pub const CR_SERVER_LOST: i64 = 2013;

/// Error reported by a client call, with the native error code and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub code: i64,
    pub message: String,
}

impl ClientError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The server dropped the connection while a statement was in flight.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self.code, CR_SERVER_GONE_ERROR | CR_SERVER_LOST)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ClientError {}

/// Opens connections from a [`ConnectionConfig`].
pub trait Connector {
    type Conn: DbConnection;

    /// Open a fresh handle.
    ///
    /// # Errors
    /// Returns the client's connect error.
    fn connect(&mut self, config: &ConnectionConfig) -> Result<Self::Conn, ClientError>;

    /// How string literals must be quoted for this backend.
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }
}

/// One open connection handle.
pub trait DbConnection {
    /// Lightweight round-trip; `false` means the handle is no longer usable.
    fn ping(&mut self) -> bool;

    /// # Errors
    /// Returns the client error if the character set is rejected.
    fn set_charset(&mut self, charset: &str) -> Result<(), ClientError>;

    /// Run one statement.
    ///
    /// # Errors
    /// Returns the client error, including its native code.
    fn execute(&mut self, sql: &str) -> Result<ResultSet, ClientError>;

    /// Id generated by the last `INSERT`, if the client tracks one.
    fn last_insert_id(&self) -> i64 {
        0
    }

    /// # Errors
    /// Returns the client error if the transaction cannot be started.
    fn begin(&mut self) -> Result<(), ClientError> {
        self.execute("START TRANSACTION").map(|_| ())
    }

    /// # Errors
    /// Returns the client error if the commit fails.
    fn commit(&mut self) -> Result<(), ClientError> {
        self.execute("COMMIT").map(|_| ())
    }

    /// # Errors
    /// Returns the client error if the rollback fails.
    fn rollback(&mut self) -> Result<(), ClientError> {
        self.execute("ROLLBACK").map(|_| ())
    }

    /// Release the handle.
    fn close(self)
    where
        Self: Sized,
    {
    }
}
