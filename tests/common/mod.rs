//! Shared test utilities for lazydb integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use lazydb::{
    ConnectRequest, DatabaseClient, DatabaseError, FetchMode, PreparedStatement, Row, Session,
    Value,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counters and recorded requests shared between a test and its mock client
#[derive(Default)]
pub struct MockState {
    pub connects: AtomicUsize,
    pub fail_next_connects: AtomicUsize,
    pub requests: Mutex<Vec<ConnectRequest>>,
}

impl MockState {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> ConnectRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection attempt recorded")
    }
}

/// Database client that never touches the network
///
/// Connection attempts are counted and recorded. Attempts fail while
/// `fail_next_connects` is non-zero, and each attempt can be slowed down to
/// widen race windows.
pub struct MockClient {
    state: Arc<MockState>,
    delay: Duration,
}

impl MockClient {
    pub fn new() -> (Self, Arc<MockState>) {
        let state = Arc::new(MockState::default());
        (
            Self {
                state: Arc::clone(&state),
                delay: Duration::ZERO,
            },
            state,
        )
    }

    pub fn with_delay(delay: Duration) -> (Self, Arc<MockState>) {
        let (mut client, state) = Self::new();
        client.delay = delay;
        (client, state)
    }
}

pub const ACCESS_DENIED: &str = "SQLSTATE[HY000] [1045] Access denied for user 'app'";

#[async_trait]
impl DatabaseClient for MockClient {
    type Session = MockSession;

    const PROTOCOL: &'static str = "mysql";

    async fn connect(&self, request: ConnectRequest) -> Result<MockSession, DatabaseError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .state
            .fail_next_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DatabaseError::Connection(ACCESS_DENIED.to_string()));
        }

        Ok(MockSession {
            fetch_mode: request.options.fetch_mode(),
            in_transaction: AtomicBool::new(false),
            last_insert_id: AtomicU64::new(0),
        })
    }
}

/// Session with scripted behaviour keyed off the SQL text
///
/// - SQL containing `BROKEN` fails to prepare
/// - SQL containing `FAIL_EXEC` prepares but fails to execute
/// - `SELECT` statements return one row with a `value` column per parameter,
///   or a single `1` column when there are no parameters
/// - `INSERT` statements bump the last insert id
#[derive(Debug)]
pub struct MockSession {
    fetch_mode: FetchMode,
    in_transaction: AtomicBool,
    last_insert_id: AtomicU64,
}

#[derive(Debug)]
pub struct MockStatement {
    sql: String,
    rows: VecDeque<Row>,
    row_count: u64,
}

impl PreparedStatement for MockStatement {
    fn query_string(&self) -> &str {
        &self.sql
    }

    fn fetch(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }
}

impl MockSession {
    fn rows_for(&self, sql: &str, params: &[Value]) -> Vec<Row> {
        if !sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
            return Vec::new();
        }
        if params.is_empty() {
            let columns: Arc<[String]> = vec!["1".to_string()].into();
            return vec![Row::new(columns, vec![Value::Int(1)], self.fetch_mode)];
        }
        let columns: Arc<[String]> = vec!["value".to_string()].into();
        params
            .iter()
            .map(|param| Row::new(Arc::clone(&columns), vec![param.clone()], self.fetch_mode))
            .collect()
    }

    fn affected(&self, sql: &str) -> u64 {
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            self.last_insert_id.fetch_add(1, Ordering::SeqCst);
        }
        1
    }
}

#[async_trait]
impl Session for MockSession {
    type Statement = MockStatement;

    async fn prepare(&self, sql: &str) -> Result<MockStatement, DatabaseError> {
        if sql.contains("BROKEN") {
            return Err(DatabaseError::Query(format!("syntax error near '{sql}'")));
        }
        Ok(MockStatement {
            sql: sql.to_string(),
            rows: VecDeque::new(),
            row_count: 0,
        })
    }

    async fn execute(
        &self,
        statement: &mut MockStatement,
        params: &[Value],
    ) -> Result<(), DatabaseError> {
        if statement.sql.contains("FAIL_EXEC") {
            return Err(DatabaseError::Query("execution failed".to_string()));
        }
        let rows = self.rows_for(&statement.sql, params);
        statement.row_count = if rows.is_empty() {
            self.affected(&statement.sql)
        } else {
            rows.len() as u64
        };
        statement.rows = rows.into();
        Ok(())
    }

    async fn exec(&self, sql: &str) -> Result<u64, DatabaseError> {
        if sql.contains("bad_column") {
            return Err(DatabaseError::Query(
                "Unknown column 'bad_column' in 'field list'".to_string(),
            ));
        }
        Ok(self.affected(sql))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        if sql.contains("BROKEN") {
            return Err(DatabaseError::Query(format!("syntax error near '{sql}'")));
        }
        Ok(self.rows_for(sql, params))
    }

    async fn begin_transaction(&self) -> Result<(), DatabaseError> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(DatabaseError::Query(
                "There is already an active transaction".to_string(),
            ));
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), DatabaseError> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::Query("There is no active transaction".to_string()));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DatabaseError> {
        self.commit().await
    }

    async fn in_transaction(&self) -> Result<bool, DatabaseError> {
        Ok(self.in_transaction.load(Ordering::SeqCst))
    }

    async fn last_insert_id(&self) -> Result<Option<u64>, DatabaseError> {
        let id = self.last_insert_id.load(Ordering::SeqCst);
        Ok((id > 0).then_some(id))
    }
}
