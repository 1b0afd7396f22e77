//! MySQL driver implementation
//!
//! `mysql_async` connections need exclusive access for every round trip, so
//! the session keeps its connection behind an async mutex and concurrent
//! callers are served one at a time.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Params};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{report, transaction_change};
use crate::client::{ConnectRequest, DatabaseClient, PreparedStatement, Session};
use crate::error::{DatabaseError, Result};
use crate::options::{DriverOptions, FetchMode};
use crate::value::{Row, Value};

/// Client opening sessions against MySQL or MariaDB
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlClient;

impl MySqlClient {
    /// Create a new client
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    type Session = MySqlSession;

    const PROTOCOL: &'static str = "mysql";

    async fn connect(&self, request: ConnectRequest) -> Result<MySqlSession> {
        let mode = request.options.error_mode();
        let opts = connect_opts(&request).map_err(|e| report(mode, e))?;

        let connect = Conn::new(opts);
        let conn = match request.options.connect_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                report(
                    mode,
                    DatabaseError::Connection(format!("timed out after {timeout:?}")),
                )
            })?,
            None => connect.await,
        }
        .map_err(|e| report(mode, DatabaseError::Connection(e.to_string())))?;

        debug!("MySQL session opened to {}", request.descriptor);
        Ok(MySqlSession {
            conn: Mutex::new(conn),
            options: request.options,
            in_transaction: AtomicBool::new(false),
        })
    }
}

fn connect_opts(request: &ConnectRequest) -> Result<OptsBuilder> {
    let descriptor = &request.descriptor;
    if descriptor.protocol() != MySqlClient::PROTOCOL {
        return Err(DatabaseError::Config(format!(
            "MySQL descriptor must start with {}:, got {}:",
            MySqlClient::PROTOCOL,
            descriptor.protocol()
        )));
    }

    let mut opts = OptsBuilder::default()
        .ip_or_hostname(descriptor.get("host").unwrap_or_default())
        .user(request.user.clone())
        .pass(request.password.clone())
        .db_name(descriptor.get("dbname"));

    if let Some(port) = descriptor.get("port") {
        let port = port
            .parse::<u16>()
            .map_err(|_| DatabaseError::Config(format!("Invalid port: {port}")))?;
        opts = opts.tcp_port(port);
    }
    if let Some(charset) = descriptor.get("charset") {
        opts = opts.init(vec![format!("SET NAMES {charset}")]);
    }
    Ok(opts)
}

/// An open MySQL session
pub struct MySqlSession {
    conn: Mutex<Conn>,
    options: DriverOptions,
    in_transaction: AtomicBool,
}

impl MySqlSession {
    fn query_error(&self, err: &mysql_async::Error) -> DatabaseError {
        report(
            self.options.error_mode(),
            DatabaseError::Query(err.to_string()),
        )
    }

    fn track_transaction(&self, sql: &str) {
        if let Some(open) = transaction_change(sql) {
            self.in_transaction.store(open, Ordering::Release);
        }
    }

    async fn run_transaction_command(&self, sql: &str, open: bool) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.query_drop(sql)
            .await
            .map_err(|e| self.query_error(&e))?;
        self.in_transaction.store(open, Ordering::Release);
        Ok(())
    }
}

/// A MySQL statement, prepared on the server unless prepares are emulated
pub struct MySqlStatement {
    sql: String,
    prepared: Option<mysql_async::Statement>,
    rows: VecDeque<Row>,
    row_count: u64,
}

impl PreparedStatement for MySqlStatement {
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

#[async_trait]
impl Session for MySqlSession {
    type Statement = MySqlStatement;

    async fn prepare(&self, sql: &str) -> Result<MySqlStatement> {
        let prepared = if self.options.emulate_prepares() {
            None
        } else {
            let mut conn = self.conn.lock().await;
            Some(conn.prep(sql).await.map_err(|e| self.query_error(&e))?)
        };
        Ok(MySqlStatement {
            sql: sql.to_string(),
            prepared,
            rows: VecDeque::new(),
            row_count: 0,
        })
    }

    async fn execute(&self, statement: &mut MySqlStatement, params: &[Value]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let params = to_params(params);
        let rows: Vec<mysql_async::Row> = match &statement.prepared {
            Some(prepared) => conn.exec::<mysql_async::Row, _, _>(prepared.clone(), params).await,
            None => {
                conn.exec::<mysql_async::Row, _, _>(statement.sql.as_str(), params)
                    .await
            }
        }
        .map_err(|e| self.query_error(&e))?;

        statement.row_count = if rows.is_empty() {
            conn.affected_rows()
        } else {
            rows.len() as u64
        };
        statement.rows = convert_rows(&rows, self.options.fetch_mode());
        self.track_transaction(&statement.sql);
        Ok(())
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        conn.query_drop(sql)
            .await
            .map_err(|e| self.query_error(&e))?;
        self.track_transaction(sql);
        Ok(conn.affected_rows())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<mysql_async::Row> = if params.is_empty() {
            conn.query::<mysql_async::Row, _>(sql).await
        } else {
            conn.exec::<mysql_async::Row, _, _>(sql, to_params(params))
                .await
        }
        .map_err(|e| self.query_error(&e))?;
        self.track_transaction(sql);
        Ok(convert_rows(&rows, self.options.fetch_mode()).into())
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.run_transaction_command("START TRANSACTION", true)
            .await
    }

    async fn commit(&self) -> Result<()> {
        self.run_transaction_command("COMMIT", false).await
    }

    async fn rollback(&self) -> Result<()> {
        self.run_transaction_command("ROLLBACK", false).await
    }

    async fn in_transaction(&self) -> Result<bool> {
        Ok(self.in_transaction.load(Ordering::Acquire))
    }

    async fn last_insert_id(&self) -> Result<Option<u64>> {
        Ok(self.conn.lock().await.last_insert_id())
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(to_mysql).collect())
    }
}

fn to_mysql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(flag) => mysql_async::Value::Int(i64::from(*flag)),
        Value::Int(n) => mysql_async::Value::Int(*n),
        Value::UInt(n) => mysql_async::Value::UInt(*n),
        Value::Float(f) => mysql_async::Value::Double(*f),
        Value::Text(text) => mysql_async::Value::Bytes(text.as_bytes().to_vec()),
        Value::Bytes(bytes) => mysql_async::Value::Bytes(bytes.clone()),
    }
}

fn from_mysql(value: &mysql_async::Value) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Int(n) => Value::Int(*n),
        mysql_async::Value::UInt(n) => Value::UInt(*n),
        mysql_async::Value::Float(f) => Value::Float(f64::from(*f)),
        mysql_async::Value::Double(f) => Value::Float(*f),
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text =
                format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::Text(text)
        }
        mysql_async::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = u32::from(*hours) + days * 24;
            let sign = if *negative { "-" } else { "" };
            let mut text = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::Text(text)
        }
    }
}

fn convert_rows(rows: &[mysql_async::Row], mode: FetchMode) -> VecDeque<Row> {
    let Some(first) = rows.first() else {
        return VecDeque::new();
    };
    let columns: Arc<[String]> = first
        .columns_ref()
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect();

    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|i| row.as_ref(i).map_or(Value::Null, from_mysql))
                .collect();
            Row::new(Arc::clone(&columns), values, mode)
        })
        .collect()
}
