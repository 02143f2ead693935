//! Typed-placeholder SQL compilation and a self-healing single-connection executor.
//!
//! Templates use `?n` (identifier), `?s` (string), `?i` (integer), `?a` (list), `?u` (SET
//! payload) and `?p` (raw SQL). [`Database`] runs the compiled SQL over one connection that is
//! opened lazily, pinged after idling, and replaced once if the server drops it mid-statement.

pub mod batch;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod escape;
pub mod executor;
pub mod helpers;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod results;
pub mod stats;
pub mod template;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use batch::BatchInsert;
pub use client::{ClientError, Connector, DbConnection};
pub use config::{ConnectionConfig, ConnectionConfigBuilder, ManagerOptions};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::SqlGuardError;
pub use escape::Dialect;
pub use executor::Database;
pub use registry::Registry;
pub use results::{DbRow, ResultSet};
pub use stats::ExecutionRecord;
pub use template::{PreparedTemplate, compile, compile_with};
pub use types::{SetPayload, SetValue, SqlArg, SqlValue};
