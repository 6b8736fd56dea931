//! Scripted in-memory connection for unit tests.

use crate::arguments::ParamSlots;
use crate::client::{Connection, Execution};
use crate::error::{FluentError, FluentResult};
use crate::provider::ConnectionProvider;
use crate::result_set::ResultSet;
use crate::value::SqlValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) enum Outcome {
    Rows(ResultSet),
    Updated(u64),
    Fail(FluentError),
}

#[derive(Default)]
struct State {
    prepared: Vec<String>,
    bound: Vec<ParamSlots>,
    outcomes: VecDeque<Outcome>,
    fail_prepare: bool,
}

/// Clones share the same script and recordings.
#[derive(Clone, Default)]
pub(crate) struct MockConnection {
    state: Arc<Mutex<State>>,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next `run`. Unscripted runs report one
    /// updated row.
    pub(crate) fn then(self, outcome: Outcome) -> Self {
        self.state.lock().unwrap().outcomes.push_back(outcome);
        self
    }

    pub(crate) fn then_rows(self, rows: ResultSet) -> Self {
        self.then(Outcome::Rows(rows))
    }

    pub(crate) fn then_fail(self, message: &str) -> Self {
        self.then(Outcome::Fail(FluentError::UniqueViolation(message.to_string())))
    }

    pub(crate) fn failing_prepare(self) -> Self {
        self.state.lock().unwrap().fail_prepare = true;
        self
    }

    pub(crate) fn prepared(&self) -> Vec<String> {
        self.state.lock().unwrap().prepared.clone()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.state.lock().unwrap().bound.len()
    }

    /// Bound parameters of every run, rendered with their log form.
    pub(crate) fn bound(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .bound
            .iter()
            .map(|slots| {
                (1..=slots.len())
                    .map(|i| slots.get(i).map_or("<unset>".to_string(), ToString::to_string))
                    .collect()
            })
            .collect()
    }
}

impl Connection for MockConnection {
    type Statement = String;

    async fn prepare(&self, sql: &str) -> FluentResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_prepare {
            return Err(FluentError::Other(format!("syntax error in {sql}")));
        }
        state.prepared.push(sql.to_string());
        Ok(sql.to_string())
    }

    async fn run(&self, _stmt: &String, params: &ParamSlots) -> FluentResult<Execution> {
        params.as_params()?;
        let mut state = self.state.lock().unwrap();
        state.bound.push(params.clone());
        match state.outcomes.pop_front() {
            Some(Outcome::Rows(rs)) => Ok(Execution::Rows(rs)),
            Some(Outcome::Updated(n)) => Ok(Execution::Updated(n)),
            Some(Outcome::Fail(e)) => Err(e),
            None => Ok(Execution::Updated(1)),
        }
    }
}

/// Hands out clones of one [`MockConnection`].
pub(crate) struct MockProvider {
    conn: MockConnection,
    connects: AtomicUsize,
    fail: bool,
}

impl MockProvider {
    pub(crate) fn new(conn: MockConnection) -> Self {
        Self {
            conn,
            connects: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(MockConnection::new())
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ConnectionProvider for MockProvider {
    type Connection = MockConnection;

    async fn connect(&self) -> FluentResult<MockConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FluentError::Connection("connection refused".into()));
        }
        Ok(self.conn.clone())
    }
}

/// Single-column result set of longs.
pub(crate) fn longs(column: &str, values: &[i64]) -> ResultSet {
    let mut rs = ResultSet::new([column]);
    for v in values {
        rs.push_row(vec![SqlValue::Long(*v)]).unwrap();
    }
    rs
}
