//! Run command

use crate::client::{DatabaseClient, PreparedStatement};
use crate::database::{Database, RunOutcome};
use crate::value::{Row, Value};
use anyhow::Result;
use tracing::{debug, error};

/// Prepare and execute `sql`, printing rows as JSON or the affected row count
pub async fn handle_run<C: DatabaseClient>(
    db: &Database<C>,
    sql: &str,
    params: &[String],
) -> Result<()> {
    let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
    debug!("Running statement with {} parameter(s)", params.len());

    match db.run(sql, &params).await? {
        RunOutcome::Executed(mut statement) => {
            let rows = statement.fetch_all();
            if rows.is_empty() {
                println!("✅ {} row(s) affected", statement.row_count());
            } else {
                println!("{}", render_rows(&rows)?);
            }
            Ok(())
        }
        RunOutcome::PrepareFailed(e) => {
            error!("Failed to prepare statement: {}", e);
            Err(anyhow::anyhow!("Failed to prepare statement: {}", e))
        }
        RunOutcome::ExecuteFailed(e) => {
            error!("Failed to execute statement: {}", e);
            Err(anyhow::anyhow!("Failed to execute statement: {}", e))
        }
    }
}

/// Interpret a command line parameter as the narrowest matching value
///
/// `NULL` (any case) becomes SQL NULL, `true`/`false` become booleans and
/// numbers become integers or floats. Everything else is text.
#[must_use]
pub fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(flag) = raw.parse::<bool>() {
        Value::Bool(flag)
    } else if let Ok(n) = raw.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Text(raw.to_string())
    }
}

/// Render rows as pretty JSON
pub fn render_rows(rows: &[Row]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::FetchMode;
    use std::sync::Arc;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("NULL"), Value::Null);
        assert_eq!(parse_param("true"), Value::Bool(true));
        assert_eq!(parse_param("42"), Value::Int(42));
        assert_eq!(parse_param("-1.5"), Value::Float(-1.5));
        assert_eq!(parse_param("ada"), Value::Text("ada".into()));
        assert_eq!(parse_param("NaNcy"), Value::Text("NaNcy".into()));
    }

    #[test]
    fn test_render_rows() {
        let columns: Arc<[String]> = vec!["id".to_string()].into();
        let rows = vec![Row::new(columns, vec![Value::Int(1)], FetchMode::Assoc)];
        let rendered = render_rows(&rows).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, serde_json::json!([{"id": 1}]));
    }
}
