//! Convenient imports for common functionality.

pub use crate::batch::BatchInsert;
pub use crate::client::{Connector, DbConnection};
pub use crate::config::{ConnectionConfig, ManagerOptions};
pub use crate::connection::ConnectionState;
pub use crate::error::SqlGuardError;
pub use crate::escape::Dialect;
pub use crate::executor::Database;
pub use crate::helpers::{filter_payload, whitelist};
pub use crate::registry::Registry;
pub use crate::results::{DbRow, ResultSet};
pub use crate::template::{PreparedTemplate, compile, compile_with};
pub use crate::types::{SetPayload, SetValue, SqlArg, SqlValue};
pub use crate::sql_args;
