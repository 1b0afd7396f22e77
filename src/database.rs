//! # Lazily connected database handle
//!
//! [`Database`] holds the connection parameters, opens a single session on
//! first use and hands that same session to every later caller. It is meant
//! to be built once at the composition root and shared, usually behind an
//! `Arc`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lazydb::{Database, MySqlClient, RunOutcome};
//! use lazydb::client::PreparedStatement;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(MySqlClient::new());
//! db.set_host("localhost");
//! db.set_database_name(Some("shop".to_string()));
//! db.set_user(Some("app".to_string()));
//!
//! if let RunOutcome::Executed(mut stmt) = db.run("SELECT id FROM orders WHERE total > ?", &[100.into()]).await? {
//!     for row in stmt.fetch_all() {
//!         println!("{:?}", row.get("id"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Caveats
//!
//! Configuration changes made after the session exists are stored but never
//! reach the live session; the next connection would only happen in a new
//! `Database`. A warning is logged when this happens.
//!
//! The session is shared as-is. Whether concurrent operations on it run in
//! parallel or queue up depends on the driver.

use crate::client::{ConnectRequest, DatabaseClient, Session};
use crate::config::ConnectionConfig;
use crate::descriptor::Descriptor;
use crate::error::{DatabaseError, Result};
use crate::options::DriverOptions;
use crate::value::{Row, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Prepared statement type produced by client `C`
pub type StatementOf<C> = <<C as DatabaseClient>::Session as Session>::Statement;

/// Result of [`Database::run`]
///
/// Preparation and execution failures are reported here as values instead
/// of errors. Only a failure to connect makes `run` itself return `Err`.
#[must_use]
#[derive(Debug)]
pub enum RunOutcome<S> {
    /// The statement was prepared and executed; results can be fetched from it
    Executed(S),
    /// The driver refused to prepare the statement
    PrepareFailed(DatabaseError),
    /// The statement was prepared but execution failed
    ExecuteFailed(DatabaseError),
}

impl<S> RunOutcome<S> {
    /// Whether preparation or execution failed
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Executed(_))
    }

    /// The executed statement, discarding any failure
    pub fn statement(self) -> Option<S> {
        match self {
            Self::Executed(statement) => Some(statement),
            _ => None,
        }
    }

    /// The failure, if there was one
    pub fn error(&self) -> Option<&DatabaseError> {
        match self {
            Self::Executed(_) => None,
            Self::PrepareFailed(err) | Self::ExecuteFailed(err) => Some(err),
        }
    }

    /// Convert into a `Result`, for callers who prefer to propagate
    pub fn into_result(self) -> Result<S> {
        match self {
            Self::Executed(statement) => Ok(statement),
            Self::PrepareFailed(err) | Self::ExecuteFailed(err) => Err(err),
        }
    }
}

/// Connection parameters plus a lazily opened, shared session
pub struct Database<C: DatabaseClient> {
    client: C,
    config: RwLock<ConnectionConfig>,
    session: OnceCell<Arc<C::Session>>,
    // Holds the failure of the most recent attempt for callers that queued behind it
    connect_lock: Mutex<Option<DatabaseError>>,
    attempts: AtomicU64,
}

impl<C: DatabaseClient> Database<C> {
    /// Create a handle with default connection parameters
    pub fn new(client: C) -> Self {
        Self::with_config(client, ConnectionConfig::default())
    }

    /// Create a handle with the given connection parameters
    pub fn with_config(client: C, config: ConnectionConfig) -> Self {
        Self {
            client,
            config: RwLock::new(config),
            session: OnceCell::new(),
            connect_lock: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Set the server hostname or IP
    pub fn set_host(&self, host: impl Into<String>) {
        let host = host.into();
        self.configure("host", |config| config.set_host(host));
    }

    /// Set the server port ([`DEFAULT_PORT`](crate::config::DEFAULT_PORT) unless changed)
    pub fn set_port(&self, port: u16) {
        self.configure("port", |config| config.set_port(port));
    }

    /// Set the default database
    pub fn set_database_name(&self, name: Option<String>) {
        self.configure("database_name", |config| config.set_database_name(name));
    }

    /// Set the connection charset ([`DEFAULT_CHARSET`](crate::config::DEFAULT_CHARSET) unless changed)
    pub fn set_charset(&self, charset: impl Into<String>) {
        let charset = charset.into();
        self.configure("charset", |config| config.set_charset(charset));
    }

    /// Set the user to authenticate as
    pub fn set_user(&self, user: Option<String>) {
        self.configure("user", |config| config.set_user(user));
    }

    /// Set the password to authenticate with
    pub fn set_password(&self, password: Option<String>) {
        self.configure("password", |config| config.set_password(password));
    }

    /// Merge driver options; keys already set keep their value unless overwritten
    pub fn merge_driver_options(&self, options: DriverOptions) {
        self.configure("driver_options", |config| config.merge_driver_options(options));
    }

    fn configure(&self, field: &str, update: impl FnOnce(&mut ConnectionConfig)) {
        if self.is_connected() {
            warn!(
                "Setting {} after the connection was established; the live session is unaffected",
                field
            );
        }
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut config);
    }

    /// Descriptor that the next connection attempt would use
    pub fn descriptor(&self) -> Descriptor {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .descriptor(C::PROTOCOL)
    }

    /// Whether a session has been opened
    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    fn connect_request(&self) -> ConnectRequest {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        ConnectRequest {
            descriptor: config.descriptor(C::PROTOCOL),
            user: config.user().map(String::from),
            password: config.password().map(String::from),
            options: config.driver_options().clone(),
        }
    }

    /// Return the shared session, opening it on first use
    ///
    /// Only one connection attempt runs at a time. Callers that were waiting
    /// on an attempt that failed receive that same error; a call made after
    /// the failure tries again.
    pub async fn connection(&self) -> Result<Arc<C::Session>> {
        if let Some(session) = self.session.get() {
            return Ok(Arc::clone(session));
        }

        let observed = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.connect_lock.lock().await;

        if let Some(session) = self.session.get() {
            return Ok(Arc::clone(session));
        }
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(err) = last_failure.as_ref() {
                debug!("Sharing failure of concurrent connection attempt: {}", err);
                return Err(err.clone());
            }
        }

        let request = self.connect_request();
        debug!("Connecting to {}", request.descriptor);
        let result = self.client.connect(request).await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(session) => {
                let session = Arc::new(session);
                // Only the lock holder writes the cell, so it is still empty here
                let _ = self.session.set(Arc::clone(&session));
                *last_failure = None;
                info!("Database connection established");
                Ok(session)
            }
            Err(err) => {
                debug!("Connection attempt failed: {}", err);
                *last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Run an operation against the shared session
    ///
    /// The operation's result, success or error, is returned unchanged.
    pub async fn forward<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<C::Session>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.connection().await?;
        operation(session).await
    }

    /// Prepare and execute `sql` with `params`
    ///
    /// Unlike the other operations, preparation and execution failures come
    /// back inside [`RunOutcome`] rather than as `Err`.
    pub async fn run(&self, sql: &str, params: &[Value]) -> Result<RunOutcome<StatementOf<C>>> {
        let session = self.connection().await?;

        let mut statement = match session.prepare(sql).await {
            Ok(statement) => statement,
            Err(err) => {
                debug!("Preparing statement failed: {}", err);
                return Ok(RunOutcome::PrepareFailed(err));
            }
        };

        if let Err(err) = session.execute(&mut statement, params).await {
            debug!("Executing statement failed: {}", err);
            return Ok(RunOutcome::ExecuteFailed(err));
        }

        Ok(RunOutcome::Executed(statement))
    }

    /// Execute SQL directly, returning the number of affected rows
    pub async fn exec(&self, sql: &str) -> Result<u64> {
        self.forward(|session| async move { session.exec(sql).await })
            .await
    }

    /// Run a parameterised query and collect every row
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.forward(|session| async move { session.query(sql, params).await })
            .await
    }

    /// Prepare a statement on the shared session
    pub async fn prepare(&self, sql: &str) -> Result<StatementOf<C>> {
        self.forward(|session| async move { session.prepare(sql).await })
            .await
    }

    /// Execute a statement obtained from [`prepare`](Self::prepare)
    pub async fn execute(&self, statement: &mut StatementOf<C>, params: &[Value]) -> Result<()> {
        self.forward(|session| async move { session.execute(statement, params).await })
            .await
    }

    /// Start a transaction
    pub async fn begin_transaction(&self) -> Result<()> {
        self.forward(|session| async move { session.begin_transaction().await })
            .await
    }

    /// Commit the current transaction
    pub async fn commit(&self) -> Result<()> {
        self.forward(|session| async move { session.commit().await })
            .await
    }

    /// Roll back the current transaction
    pub async fn rollback(&self) -> Result<()> {
        self.forward(|session| async move { session.rollback().await })
            .await
    }

    /// Whether a transaction is currently open
    pub async fn in_transaction(&self) -> Result<bool> {
        self.forward(|session| async move { session.in_transaction().await })
            .await
    }

    /// Identifier generated by the most recent insert
    pub async fn last_insert_id(&self) -> Result<Option<u64>> {
        self.forward(|session| async move { session.last_insert_id().await })
            .await
    }
}
