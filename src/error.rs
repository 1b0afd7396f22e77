use thiserror::Error;

/// Errors raised by drivers and passed through `Database` unchanged
///
/// The type is `Clone` so that every caller waiting on the same failed
/// connection attempt can receive the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// The driver could not establish a session
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A statement failed to prepare or execute
    #[error("Database query error: {0}")]
    Query(String),

    /// The connection parameters or driver options were rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Errors that can occur while loading connection configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error occurred while reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error occurred
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The connection URL could not be parsed
    #[error("Invalid connection URL: {0}")]
    Url(#[from] url::ParseError),

    /// The URL scheme does not name a known driver
    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme {
        /// The scheme found in the URL
        scheme: String,
    },
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;
