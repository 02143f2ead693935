//! Lifecycle of the single underlying connection: lazy connect, idle ping, bounded reconnect.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::client::{ClientError, Connector, DbConnection};
use crate::config::{ConnectionConfig, ManagerOptions};
use crate::error::SqlGuardError;
use crate::escape::Dialect;

/// Observable state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No handle yet, or the last one was discarded
    Unconnected,
    /// Used within the idle threshold; trusted without a ping
    ConnectedFresh,
    /// Quiet for longer than the idle threshold; the next access pings first
    ConnectedIdleUnverified,
    /// The last reconnect loop gave up; the next access starts a new loop
    Failed,
}

/// Running totals, mostly useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleCounters {
    pub connect_attempts: u64,
    pub connects: u64,
    pub pings: u64,
    pub failed_pings: u64,
}

enum Slot<Conn> {
    Unconnected,
    Connected { conn: Conn, last_used: Instant },
    Failed,
}

/// Owns exactly one connection handle and decides when it must be verified or replaced.
///
/// All I/O blocks the calling thread. The only other pause is the fixed backoff between
/// connect attempts.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    slot: Slot<C::Conn>,
    idle_threshold: Duration,
    reconnect_attempts: u32,
    reconnect_backoff: Duration,
    counters: LifecycleCounters,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. Nothing is opened until the first [`acquire`](Self::acquire).
    pub fn new(connector: C, config: ConnectionConfig, options: &ManagerOptions) -> Self {
        Self {
            connector,
            config,
            slot: Slot::Unconnected,
            idle_threshold: options.idle_threshold,
            reconnect_attempts: options.reconnect_attempts.max(1),
            reconnect_backoff: options.reconnect_backoff,
            counters: LifecycleCounters::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.connector.dialect()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match &self.slot {
            Slot::Unconnected => ConnectionState::Unconnected,
            Slot::Failed => ConnectionState::Failed,
            Slot::Connected { last_used, .. } => {
                if last_used.elapsed() < self.idle_threshold {
                    ConnectionState::ConnectedFresh
                } else {
                    ConnectionState::ConnectedIdleUnverified
                }
            }
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.slot, Slot::Connected { .. })
    }

    #[must_use]
    pub fn counters(&self) -> LifecycleCounters {
        self.counters
    }

    pub fn set_idle_threshold(&mut self, idle_threshold: Duration) {
        self.idle_threshold = idle_threshold;
    }

    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Zero attempts is treated as one.
    pub fn set_reconnect_policy(&mut self, attempts: u32, backoff: Duration) {
        self.reconnect_attempts = attempts.max(1);
        self.reconnect_backoff = backoff;
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> (u32, Duration) {
        (self.reconnect_attempts, self.reconnect_backoff)
    }

    /// Return a live handle, connecting, pinging or reconnecting as the state requires.
    ///
    /// # Errors
    /// Returns `SqlGuardError::ConnectError` once every connect attempt has failed.
    pub fn acquire(&mut self) -> Result<&mut C::Conn, SqlGuardError> {
        if !self.verify_current() {
            self.reconnect()?;
        }
        self.connected_mut()
    }

    /// Discard the current handle and run the connect loop unconditionally.
    ///
    /// # Errors
    /// Returns `SqlGuardError::ConnectError` once every connect attempt has failed.
    pub fn force_reconnect(&mut self) -> Result<&mut C::Conn, SqlGuardError> {
        self.reconnect()?;
        self.connected_mut()
    }

    /// Current handle without any liveness check.
    pub fn current_mut(&mut self) -> Option<&mut C::Conn> {
        match &mut self.slot {
            Slot::Connected { conn, .. } => Some(conn),
            Slot::Unconnected | Slot::Failed => None,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&C::Conn> {
        match &self.slot {
            Slot::Connected { conn, .. } => Some(conn),
            Slot::Unconnected | Slot::Failed => None,
        }
    }

    /// Record a successful use; restarts the idle clock.
    pub fn touch(&mut self) {
        if let Slot::Connected { last_used, .. } = &mut self.slot {
            *last_used = Instant::now();
        }
    }

    /// Close the handle (if any) and return to `Unconnected`.
    pub fn disconnect(&mut self) {
        if let Slot::Connected { conn, .. } = std::mem::replace(&mut self.slot, Slot::Unconnected) {
            conn.close();
            tracing::debug!(server = %self.config.describe(), "connection closed");
        }
    }

    /// True when the current handle can be used as-is (pinging it first if idle).
    fn verify_current(&mut self) -> bool {
        let Slot::Connected { conn, last_used } = &mut self.slot else {
            return false;
        };
        if last_used.elapsed() < self.idle_threshold {
            return true;
        }
        self.counters.pings += 1;
        if conn.ping() {
            *last_used = Instant::now();
            return true;
        }
        self.counters.failed_pings += 1;
        tracing::warn!(server = %self.config.describe(), "idle connection failed ping; reconnecting");
        self.disconnect();
        false
    }

    fn connected_mut(&mut self) -> Result<&mut C::Conn, SqlGuardError> {
        self.current_mut()
            .ok_or_else(|| SqlGuardError::ConnectError("connection unavailable".into()))
    }

    fn reconnect(&mut self) -> Result<(), SqlGuardError> {
        self.disconnect();
        let attempts = self.reconnect_attempts.max(1);
        let mut last_error: Option<ClientError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 && !self.reconnect_backoff.is_zero() {
                thread::sleep(self.reconnect_backoff);
            }
            self.counters.connect_attempts += 1;
            match self.open() {
                Ok(conn) => {
                    self.counters.connects += 1;
                    self.slot = Slot::Connected {
                        conn,
                        last_used: Instant::now(),
                    };
                    tracing::debug!(server = %self.config.describe(), attempt, "connected");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        server = %self.config.describe(),
                        attempt,
                        attempts,
                        error = %err,
                        "connect attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        self.slot = Slot::Failed;
        let reason = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        Err(SqlGuardError::ConnectError(format!(
            "{} unreachable after {attempts} attempt(s): {reason}",
            self.config.describe()
        )))
    }

    fn open(&mut self) -> Result<C::Conn, ClientError> {
        let mut conn = self.connector.connect(&self.config)?;
        if let Some(charset) = &self.config.charset
            && let Err(err) = conn.set_charset(charset)
        {
            conn.close();
            return Err(err);
        }
        Ok(conn)
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.config.describe())
            .field("state", &self.state())
            .field("idle_threshold", &self.idle_threshold)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("reconnect_backoff", &self.reconnect_backoff)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}
