use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlGuardError;

/// Parameters for opening the single underlying connection.
///
/// Supplied once at construction; every reconnect reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host name or IP address (for SQLite, ignored in favour of `database`)
    pub host: String,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Default schema; for SQLite the database file path
    #[serde(default)]
    pub database: Option<String>,
    /// Character set applied right after each successful connect
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Unix socket or named pipe
    #[serde(default)]
    pub socket: Option<String>,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: None,
            charset: None,
            port: None,
            socket: None,
        }
    }

    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(host)
    }

    /// Load a config from JSON.
    ///
    /// # Errors
    /// Returns `SqlGuardError::JsonError` if the document does not match.
    pub fn from_json(json: &str) -> Result<Self, SqlGuardError> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// `user@host[:port][/database]`, never including the password.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!("{}@{}", self.user, self.host);
        if let Some(port) = self.port {
            out.push_str(&format!(":{port}"));
        }
        if let Some(db) = &self.database {
            out.push('/');
            out.push_str(db);
        }
        out
    }
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: ConnectionConfig::new(host, "", ""),
        }
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.config.charset = Some(charset.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    #[must_use]
    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.config.socket = Some(socket.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectionConfig {
        self.config
    }
}

/// Tuning for the connection lifecycle and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Quiet time after which the connection is pinged before reuse
    #[serde(with = "duration_ms")]
    pub idle_threshold: Duration,
    /// Connect attempts per access before giving up
    pub reconnect_attempts: u32,
    /// Fixed pause between connect attempts
    #[serde(with = "duration_ms")]
    pub reconnect_backoff: Duration,
    pub stats_enabled: bool,
    pub stats_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(60),
            reconnect_attempts: 2,
            reconnect_backoff: Duration::from_millis(150),
            stats_enabled: true,
            stats_capacity: 100,
        }
    }
}

impl ManagerOptions {
    #[must_use]
    pub fn with_idle_threshold(mut self, idle_threshold: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    /// Zero attempts is treated as one.
    #[must_use]
    pub fn with_reconnect(mut self, attempts: u32, backoff: Duration) -> Self {
        self.reconnect_attempts = attempts.max(1);
        self.reconnect_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, enabled: bool, capacity: usize) -> Self {
        self.stats_enabled = enabled;
        self.stats_capacity = capacity;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_matches_fluent_setters() {
        let built = ConnectionConfig::builder("db.local")
            .user("app")
            .password("secret")
            .database("shop")
            .charset("utf8mb4")
            .port(3307)
            .finish();
        let fluent = ConnectionConfig::new("db.local", "app", "secret")
            .with_database("shop")
            .with_charset("utf8mb4")
            .with_port(3307);
        assert_eq!(built, fluent);
        assert_eq!(built.describe(), "app@db.local:3307/shop");
    }

    #[test]
    fn password_is_never_serialized() -> Result<(), SqlGuardError> {
        let config = ConnectionConfig::new("h", "u", "hunter2");
        let json = serde_json::to_string(&config)?;
        assert!(!json.contains("hunter2"));
        Ok(())
    }

    #[test]
    fn config_loads_from_json_with_defaults() -> Result<(), SqlGuardError> {
        let config = ConnectionConfig::from_json(r#"{"host":"h","user":"u","password":"p","port":3306}"#)?;
        assert_eq!(config.port, Some(3306));
        assert_eq!(config.password, "p");
        assert!(config.database.is_none());
        Ok(())
    }

    #[test]
    fn options_defaults_and_millisecond_serde() -> Result<(), SqlGuardError> {
        let options = ManagerOptions::default();
        assert_eq!(options.idle_threshold, Duration::from_secs(60));
        assert_eq!(options.reconnect_attempts, 2);
        assert_eq!(options.reconnect_backoff, Duration::from_millis(150));

        let parsed: ManagerOptions = serde_json::from_str(r#"{"reconnect_backoff": 5}"#)?;
        assert_eq!(parsed.reconnect_backoff, Duration::from_millis(5));
        assert_eq!(parsed.reconnect_attempts, 2);
        Ok(())
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let options = ManagerOptions::default().with_reconnect(0, Duration::ZERO);
        assert_eq!(options.reconnect_attempts, 1);
    }
}
