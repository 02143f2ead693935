//! Scriptable in-process connector for exercising the lifecycle and retry logic.
//!
//! Every [`MockConnection`] shares one [`MockState`] with the [`MockConnector`] that opened it,
//! so a test keeps a clone of the connector to script failures and inspect what happened.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{ClientError, Connector, DbConnection};
use crate::config::ConnectionConfig;
use crate::results::ResultSet;

/// Native code used for scripted connect failures ("Can't connect to MySQL server").
pub const MOCK_CONNECT_ERROR: i64 = 2003;

#[derive(Debug, Default)]
pub struct MockState {
    pub connect_attempts: usize,
    pub connects: usize,
    pub pings: usize,
    pub closes: usize,
    /// Every statement submitted, in order, including failed ones
    pub executed: Vec<String>,
    pub charsets: Vec<String>,
    /// Id of the connection that ran each entry in `executed`
    pub executed_on: Vec<usize>,
    pub fail_connects: usize,
    pub fail_every_connect: bool,
    pub fail_pings: usize,
    pub fail_charset: bool,
    pub execute_errors: VecDeque<ClientError>,
    pub results: VecDeque<ResultSet>,
    pub insert_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the shared state. A poisoned lock is recovered; tests only read counters.
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state().fail_connects = count;
    }

    pub fn fail_every_connect(&self, fail: bool) {
        self.state().fail_every_connect = fail;
    }

    pub fn fail_next_pings(&self, count: usize) {
        self.state().fail_pings = count;
    }

    pub fn fail_charset(&self, fail: bool) {
        self.state().fail_charset = fail;
    }

    /// The next `count` statements fail with `code`.
    pub fn fail_next_executes(&self, code: i64, message: &str, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.execute_errors.push_back(ClientError::new(code, message));
        }
    }

    /// Queue a result for the next successful statement; otherwise one affected row is reported.
    pub fn push_result(&self, result_set: ResultSet) {
        self.state().results.push_back(result_set);
    }

    pub fn set_insert_id(&self, id: i64) {
        self.state().insert_id = id;
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&mut self, _config: &ConnectionConfig) -> Result<MockConnection, ClientError> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.fail_every_connect {
            return Err(ClientError::new(MOCK_CONNECT_ERROR, "Can't connect to server"));
        }
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(ClientError::new(MOCK_CONNECT_ERROR, "Can't connect to server"));
        }
        state.connects += 1;
        Ok(MockConnection {
            id: state.connects,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    /// 1-based, in connect order.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DbConnection for MockConnection {
    fn ping(&mut self) -> bool {
        let mut state = self.state();
        state.pings += 1;
        if state.fail_pings > 0 {
            state.fail_pings -= 1;
            return false;
        }
        true
    }

    fn set_charset(&mut self, charset: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        if state.fail_charset {
            return Err(ClientError::new(2019, format!("Can't initialize character set {charset}")));
        }
        state.charsets.push(charset.to_string());
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<ResultSet, ClientError> {
        let id = self.id;
        let mut state = self.state();
        state.executed.push(sql.to_string());
        state.executed_on.push(id);
        if let Some(err) = state.execute_errors.pop_front() {
            return Err(err);
        }
        Ok(state.results.pop_front().unwrap_or_else(|| ResultSet::affected(1)))
    }

    fn last_insert_id(&self) -> i64 {
        self.state().insert_id
    }

    fn close(self) {
        self.state().closes += 1;
    }
}
