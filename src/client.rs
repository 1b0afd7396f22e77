//! Capability traits implemented by database drivers
//!
//! `Database` only ever talks to a driver through these traits. Errors
//! returned here reach the caller untouched.

use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::options::DriverOptions;
use crate::value::{Row, Value};
use async_trait::async_trait;

/// Everything a driver needs to open a session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    /// Addressing information; never contains credentials
    pub descriptor: Descriptor,
    /// User to authenticate as
    pub user: Option<String>,
    /// Password to authenticate with
    pub password: Option<String>,
    /// Driver options merged over the defaults
    pub options: DriverOptions,
}

/// A database client able to open sessions
#[async_trait]
pub trait DatabaseClient: Send + Sync + 'static {
    /// The live session type produced by [`connect`](Self::connect)
    type Session: Session;

    /// Protocol identifier used as the descriptor prefix
    const PROTOCOL: &'static str;

    /// Open a new session
    async fn connect(&self, request: ConnectRequest) -> Result<Self::Session>;
}

/// An open database session
///
/// Sessions are shared between callers through an `Arc`. Whether concurrent
/// calls run in parallel or are queued is up to each driver.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Prepared statement type
    type Statement: PreparedStatement;

    /// Prepare a statement for later execution
    async fn prepare(&self, sql: &str) -> Result<Self::Statement>;

    /// Execute a prepared statement, leaving its results on the statement
    async fn execute(&self, statement: &mut Self::Statement, params: &[Value]) -> Result<()>;

    /// Execute SQL directly, returning the number of affected rows
    async fn exec(&self, sql: &str) -> Result<u64>;

    /// Run a parameterised query and collect every row
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Start a transaction
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open
    ///
    /// Tracked on the client side. `begin_transaction`, `commit` and
    /// `rollback` update it, as do plain `BEGIN`/`START TRANSACTION`/`COMMIT`/
    /// `ROLLBACK` statements sent through the other operations. Transactions
    /// ended implicitly by the server (a MySQL DDL statement, a dropped
    /// connection) are not observed.
    async fn in_transaction(&self) -> Result<bool>;

    /// Identifier generated by the most recent insert, if any
    async fn last_insert_id(&self) -> Result<Option<u64>>;
}

/// A prepared statement that holds its results once executed
pub trait PreparedStatement: Send + 'static {
    /// SQL text the statement was prepared from
    fn query_string(&self) -> &str;

    /// Take the next result row
    fn fetch(&mut self) -> Option<Row>;

    /// Take every remaining result row
    fn fetch_all(&mut self) -> Vec<Row> {
        std::iter::from_fn(|| self.fetch()).collect()
    }

    /// Rows affected by the last execution, or rows returned for queries
    fn row_count(&self) -> u64;
}
