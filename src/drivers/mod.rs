//! Database driver implementations
//! Each driver is conditionally compiled based on features

use crate::error::DatabaseError;
use crate::options::ErrorMode;
use tracing::warn;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Apply the configured error mode to a driver error before returning it
#[allow(dead_code)]
pub(crate) fn report(mode: ErrorMode, err: DatabaseError) -> DatabaseError {
    if mode == ErrorMode::Warning {
        warn!("Database driver error: {}", err);
    }
    err
}

/// Transaction state after a successful transaction-control statement
///
/// `Some(true)` for statements that open a transaction, `Some(false)` for
/// statements that end one, `None` for everything else. Savepoint rollbacks
/// and `AND CHAIN` leave the transaction open and return `None`.
#[allow(dead_code)]
pub(crate) fn transaction_change(sql: &str) -> Option<bool> {
    let sql = sql.trim().trim_end_matches(';').to_ascii_uppercase();
    let words: Vec<&str> = sql.split_whitespace().collect();
    match words.as_slice() {
        ["BEGIN", ..] | ["START", "TRANSACTION", ..] => Some(true),
        ["COMMIT" | "ROLLBACK" | "END" | "ABORT", rest @ ..] => {
            let keeps_open = rest.contains(&"TO")
                || rest.windows(2).any(|pair| pair == ["AND", "CHAIN"]);
            (!keeps_open).then_some(false)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_returns_error_unchanged() {
        let err = DatabaseError::Query("syntax error".into());
        for mode in [ErrorMode::Exception, ErrorMode::Warning, ErrorMode::Silent] {
            assert_eq!(report(mode, err.clone()), err);
        }
    }

    #[test]
    fn test_transaction_change() {
        assert_eq!(transaction_change("BEGIN"), Some(true));
        assert_eq!(transaction_change("  start transaction read only;"), Some(true));
        assert_eq!(transaction_change("begin isolation level serializable"), Some(true));
        assert_eq!(transaction_change("COMMIT"), Some(false));
        assert_eq!(transaction_change("rollback work;"), Some(false));
        assert_eq!(transaction_change("COMMIT AND NO CHAIN"), Some(false));
        assert_eq!(transaction_change("END"), Some(false));
        assert_eq!(transaction_change("ROLLBACK TO SAVEPOINT sp1"), None);
        assert_eq!(transaction_change("COMMIT AND CHAIN"), None);
        assert_eq!(transaction_change("SAVEPOINT sp1"), None);
        assert_eq!(transaction_change("UPDATE t SET begin = 1"), None);
    }
}
