use std::collections::BTreeMap;

use crate::client::Connector;
use crate::error::SqlGuardError;
use crate::executor::Database;

/// Named [`Database`] instances owned by the application.
///
/// The first instance registered becomes the default until [`set_default`](Self::set_default)
/// picks another one.
///
/// ```rust
/// use sql_guard::prelude::*;
/// use sql_guard::sqlite::SqliteConnector;
///
/// let mut registry = Registry::new();
/// registry.register("main", Database::new(SqliteConnector::new(), ConnectionConfig::new("", "", "")));
/// let rows = registry.default_mut()?.execute("SELECT 1 AS one")?;
/// assert_eq!(rows.len(), 1);
/// # Ok::<(), SqlGuardError>(())
/// ```
#[derive(Debug)]
pub struct Registry<C: Connector> {
    instances: BTreeMap<String, Database<C>>,
    default: Option<String>,
}

impl<C: Connector> Default for Registry<C> {
    fn default() -> Self {
        Self {
            instances: BTreeMap::new(),
            default: None,
        }
    }
}

impl<C: Connector> Registry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an instance, returning the one it replaced.
    pub fn register(&mut self, name: impl Into<String>, database: Database<C>) -> Option<Database<C>> {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        tracing::debug!(name = %name, server = %database.config().describe(), "registered database");
        self.instances.insert(name, database)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Database<C>> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Database<C>> {
        self.instances.get_mut(name)
    }

    /// # Errors
    /// Returns `SqlGuardError::ConfigError` if nothing is registered under `name`.
    pub fn require_mut(&mut self, name: &str) -> Result<&mut Database<C>, SqlGuardError> {
        self.instances
            .get_mut(name)
            .ok_or_else(|| unknown(name))
    }

    /// Remove an instance. Removing the default leaves no default.
    pub fn remove(&mut self, name: &str) -> Option<Database<C>> {
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
        self.instances.remove(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    #[must_use]
    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// # Errors
    /// Returns `SqlGuardError::ConfigError` if nothing is registered under `name`.
    pub fn set_default(&mut self, name: &str) -> Result<(), SqlGuardError> {
        if !self.instances.contains_key(name) {
            return Err(unknown(name));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    /// # Errors
    /// Returns `SqlGuardError::ConfigError` when there is no default instance.
    pub fn default_mut(&mut self) -> Result<&mut Database<C>, SqlGuardError> {
        let name = self
            .default
            .clone()
            .ok_or_else(|| SqlGuardError::ConfigError("no default database registered".into()))?;
        self.require_mut(&name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

fn unknown(name: &str) -> SqlGuardError {
    SqlGuardError::ConfigError(format!("Wrong DB name: {name}"))
}
