//! PostgreSQL driver implementation
//!
//! Statements use PostgreSQL placeholders (`$1`, `$2`, ...). The underlying
//! client pipelines requests, so concurrent callers are not serialized here.
//!
//! Numeric, date/time, UUID and JSON columns come back as [`Value::Text`].
//! A result containing any other non-text column type is rejected with
//! [`DatabaseError::Unsupported`] rather than decoded lossily.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;
use tracing::{debug, error};

use super::{report, transaction_change};
use crate::client::{ConnectRequest, DatabaseClient, PreparedStatement, Session};
use crate::error::{DatabaseError, Result};
use crate::options::{DriverOptions, FetchMode};
use crate::value::{Row, Value};

type Param = Box<dyn ToSql + Sync + Send>;
type BoxError = Box<dyn std::error::Error + Sync + Send>;

const LASTVAL_SAVEPOINT: &str = "lazydb_lastval";

/// Client opening sessions against PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresClient;

impl PostgresClient {
    /// Create a new client
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    type Session = PostgresSession;

    const PROTOCOL: &'static str = "pgsql";

    async fn connect(&self, request: ConnectRequest) -> Result<PostgresSession> {
        let mode = request.options.error_mode();
        let config = pg_config(&request).map_err(|e| report(mode, e))?;

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| report(mode, DatabaseError::Connection(e.to_string())))?;

        // Spawn connection handler (required by tokio-postgres)
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        debug!("PostgreSQL session opened to {}", request.descriptor);
        Ok(PostgresSession {
            client,
            options: request.options,
            in_transaction: AtomicBool::new(false),
        })
    }
}

fn pg_config(request: &ConnectRequest) -> Result<tokio_postgres::Config> {
    let descriptor = &request.descriptor;
    if descriptor.protocol() != PostgresClient::PROTOCOL {
        return Err(DatabaseError::Config(format!(
            "PostgreSQL descriptor must start with {}:, got {}:",
            PostgresClient::PROTOCOL,
            descriptor.protocol()
        )));
    }

    let mut config = tokio_postgres::Config::new();
    config.host(descriptor.get("host").unwrap_or_default());
    if let Some(port) = descriptor.get("port") {
        let port = port
            .parse::<u16>()
            .map_err(|_| DatabaseError::Config(format!("Invalid port: {port}")))?;
        config.port(port);
    }
    if let Some(dbname) = descriptor.get("dbname") {
        config.dbname(dbname);
    }
    if let Some(charset) = descriptor.get("charset") {
        config.options(&format!("-c client_encoding={}", client_encoding(charset)));
    }
    if let Some(user) = &request.user {
        config.user(user);
    }
    if let Some(password) = &request.password {
        config.password(password);
    }
    if let Some(timeout) = request.options.connect_timeout() {
        config.connect_timeout(timeout);
    }
    Ok(config)
}

fn client_encoding(charset: &str) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "utf8mb4" | "utf8" | "utf-8" => "UTF8".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// An open PostgreSQL session
pub struct PostgresSession {
    client: Client,
    options: DriverOptions,
    in_transaction: AtomicBool,
}

impl PostgresSession {
    fn query_error(&self, err: &tokio_postgres::Error) -> DatabaseError {
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

    async fn batch(&self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| self.query_error(&e))
    }

    async fn run_transaction_command(&self, sql: &str, open: bool) -> Result<()> {
        self.batch(sql).await?;
        self.in_transaction.store(open, Ordering::Release);
        Ok(())
    }

    async fn resolve(&self, sql: &str) -> Result<tokio_postgres::Statement> {
        self.client
            .prepare(sql)
            .await
            .map_err(|e| self.query_error(&e))
    }
}

/// A PostgreSQL statement, prepared on the server unless prepares are emulated
pub struct PostgresStatement {
    sql: String,
    prepared: Option<tokio_postgres::Statement>,
    rows: VecDeque<Row>,
    row_count: u64,
}

impl PreparedStatement for PostgresStatement {
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
impl Session for PostgresSession {
    type Statement = PostgresStatement;

    async fn prepare(&self, sql: &str) -> Result<PostgresStatement> {
        let prepared = if self.options.emulate_prepares() {
            None
        } else {
            Some(self.resolve(sql).await?)
        };
        Ok(PostgresStatement {
            sql: sql.to_string(),
            prepared,
            rows: VecDeque::new(),
            row_count: 0,
        })
    }

    async fn execute(&self, statement: &mut PostgresStatement, params: &[Value]) -> Result<()> {
        let prepared = match &statement.prepared {
            Some(prepared) => prepared.clone(),
            None => self.resolve(&statement.sql).await?,
        };
        let bound = bind_params(prepared.params(), params)
            .map_err(|e| report(self.options.error_mode(), e))?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|param| &**param as &(dyn ToSql + Sync))
            .collect();

        if prepared.columns().is_empty() {
            statement.row_count = self
                .client
                .execute(&prepared, &refs)
                .await
                .map_err(|e| self.query_error(&e))?;
            statement.rows.clear();
        } else {
            let rows = self
                .client
                .query(&prepared, &refs)
                .await
                .map_err(|e| self.query_error(&e))?;
            statement.row_count = rows.len() as u64;
            statement.rows = convert_rows(&rows, self.options.fetch_mode())
                .map_err(|e| report(self.options.error_mode(), e))?;
        }
        self.track_transaction(&statement.sql);
        Ok(())
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        let affected = self
            .client
            .execute(sql, &[])
            .await
            .map_err(|e| self.query_error(&e))?;
        self.track_transaction(sql);
        Ok(affected)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let prepared = self.resolve(sql).await?;
        let bound = bind_params(prepared.params(), params)
            .map_err(|e| report(self.options.error_mode(), e))?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|param| &**param as &(dyn ToSql + Sync))
            .collect();
        let rows = self
            .client
            .query(&prepared, &refs)
            .await
            .map_err(|e| self.query_error(&e))?;
        self.track_transaction(sql);
        let rows = convert_rows(&rows, self.options.fetch_mode())
            .map_err(|e| report(self.options.error_mode(), e))?;
        Ok(rows.into())
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.run_transaction_command("BEGIN", true).await
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
        // A failing lastval() aborts the enclosing transaction
        let guarded = self.in_transaction.load(Ordering::Acquire);
        if guarded {
            self.batch(&format!("SAVEPOINT {LASTVAL_SAVEPOINT}")).await?;
        }

        let result = self.client.query_one("SELECT lastval()", &[]).await;
        let undefined = matches!(&result, Err(e) if lastval_undefined(e.code()));
        if guarded {
            let cleanup = if result.is_err() {
                format!("ROLLBACK TO SAVEPOINT {LASTVAL_SAVEPOINT}")
            } else {
                format!("RELEASE SAVEPOINT {LASTVAL_SAVEPOINT}")
            };
            self.batch(&cleanup).await?;
        }

        match result {
            Ok(row) => {
                let id: i64 = row.try_get(0).map_err(|e| self.query_error(&e))?;
                Ok(u64::try_from(id).ok())
            }
            Err(_) if undefined => {
                debug!("lastval() is not yet defined in this session");
                Ok(None)
            }
            Err(e) => Err(self.query_error(&e)),
        }
    }
}

fn bind_params(types: &[Type], params: &[Value]) -> Result<Vec<Param>> {
    if types.len() != params.len() {
        return Err(DatabaseError::Query(format!(
            "Expected {} parameters, got {}",
            types.len(),
            params.len()
        )));
    }
    types
        .iter()
        .zip(params)
        .map(|(ty, value)| bind(value, ty))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn bind(value: &Value, ty: &Type) -> Result<Param> {
    let out_of_range = || DatabaseError::Query(format!("Value {value:?} out of range for {ty}"));
    let param: Param = match value {
        Value::Null => null_for(ty),
        Value::Bool(flag) => Box::new(*flag),
        Value::Int(n) => bind_int(*n, ty).ok_or_else(out_of_range)?,
        Value::UInt(n) => i64::try_from(*n)
            .ok()
            .and_then(|n| bind_int(n, ty))
            .ok_or_else(out_of_range)?,
        Value::Float(f) if *ty == Type::FLOAT4 => Box::new(*f as f32),
        Value::Float(f) => Box::new(*f),
        Value::Text(text) => Box::new(text.clone()),
        Value::Bytes(bytes) => Box::new(bytes.clone()),
    };
    Ok(param)
}

#[allow(clippy::cast_precision_loss)]
fn bind_int(n: i64, ty: &Type) -> Option<Param> {
    let param: Param = match *ty {
        Type::INT2 => Box::new(i16::try_from(n).ok()?),
        Type::INT4 => Box::new(i32::try_from(n).ok()?),
        Type::OID => Box::new(u32::try_from(n).ok()?),
        Type::FLOAT4 => Box::new(n as f32),
        Type::FLOAT8 => Box::new(n as f64),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(n.to_string()),
        _ => Box::new(n),
    };
    Some(param)
}

fn null_for(ty: &Type) -> Param {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::OID => Box::new(None::<u32>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        _ => Box::new(None::<String>),
    }
}

/// `lastval()` raises 55000 until a sequence has been used in the session
fn lastval_undefined(code: Option<&SqlState>) -> bool {
    code == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE)
}

/// Reject column types that have no lossless mapping to [`Value`]
fn check_column_type(ty: &Type) -> Result<()> {
    let mapped = matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::BYTEA
            | Type::NUMERIC
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::UUID
            | Type::JSON
            | Type::JSONB
    );
    if mapped || <String as FromSql<'_>>::accepts(ty) {
        Ok(())
    } else {
        Err(DatabaseError::Unsupported(format!("column type {ty}")))
    }
}

/// NUMERIC rendered in its exact decimal text form
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decode the binary NUMERIC format: a header of digit count, weight, sign
/// and display scale followed by base-10000 digits
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let word = |i: usize| -> std::result::Result<u16, BoxError> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(i16::from_be_bytes(word(1)?.to_be_bytes()));
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<std::result::Result<Vec<u16>, _>>()?;
    let digit_at = |pos: i32| {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos))
            .copied()
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit_at(0).to_string());
        for pos in 1..=weight {
            text.push_str(&format!("{:04}", digit_at(pos)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

fn column<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, index: usize) -> Result<Option<T>> {
    row.try_get(index)
        .map_err(|e| DatabaseError::Query(e.to_string()))
}

fn from_pg(row: &tokio_postgres::Row, index: usize) -> Result<Value> {
    let value: Value = match *row.columns()[index].type_() {
        Type::BOOL => column::<bool>(row, index)?.into(),
        Type::INT2 => column::<i16>(row, index)?.map(i64::from).into(),
        Type::INT4 => column::<i32>(row, index)?.map(i64::from).into(),
        Type::INT8 => column::<i64>(row, index)?.into(),
        Type::OID => column::<u32>(row, index)?.map(u64::from).into(),
        Type::FLOAT4 => column::<f32>(row, index)?.map(f64::from).into(),
        Type::FLOAT8 => column::<f64>(row, index)?.into(),
        Type::BYTEA => column::<Vec<u8>>(row, index)?.into(),
        Type::NUMERIC => column::<NumericText>(row, index)?.map(|n| n.0).into(),
        Type::DATE => column::<NaiveDate>(row, index)?
            .map(|d| d.to_string())
            .into(),
        Type::TIME => column::<NaiveTime>(row, index)?
            .map(|t| t.to_string())
            .into(),
        Type::TIMESTAMP => column::<NaiveDateTime>(row, index)?
            .map(|t| t.to_string())
            .into(),
        Type::TIMESTAMPTZ => column::<DateTime<Utc>>(row, index)?
            .map(|t| t.to_rfc3339())
            .into(),
        Type::UUID => column::<Uuid>(row, index)?.map(|u| u.to_string()).into(),
        Type::JSON | Type::JSONB => column::<serde_json::Value>(row, index)?
            .map(|v| v.to_string())
            .into(),
        _ => column::<String>(row, index)?.into(),
    };
    Ok(value)
}

fn convert_rows(rows: &[tokio_postgres::Row], mode: FetchMode) -> Result<VecDeque<Row>> {
    let Some(first) = rows.first() else {
        return Ok(VecDeque::new());
    };
    for column in first.columns() {
        check_column_type(column.type_())?;
    }
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|i| from_pg(row, i))
                .collect::<Result<Vec<_>>>()?;
            Ok(Row::new(Arc::clone(&columns), values, mode))
        })
        .collect()
}
