//! `lazydb` - A lazily connected, shared database session
//!
//! Configure connection parameters on a [`Database`], then call any
//! operation; the first one opens the session and every later one reuses it.

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod database;
pub mod descriptor;
pub mod drivers;
/// Error types
pub mod error;
pub mod options;
pub mod value;

pub use client::{ConnectRequest, DatabaseClient, PreparedStatement, Session};
pub use config::{Config, ConnectionConfig, Driver};
pub use database::{Database, RunOutcome, StatementOf};
pub use descriptor::Descriptor;
pub use error::{ConfigError, DatabaseError};
pub use options::{DriverOptions, ErrorMode, FetchMode, OptionValue};
pub use value::{Row, Value};

#[cfg(feature = "mysql")]
pub use drivers::mysql::MySqlClient;
#[cfg(feature = "postgres")]
pub use drivers::postgres::PostgresClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
