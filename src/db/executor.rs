use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tokio_postgres::types::Type;
use tokio_postgres::Row;
use tracing::debug;

/// Result of running one statement. Rows preserve insertion order; the
/// column list comes from the statement's result metadata, so it is
/// correct even for an empty result set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteStep {
    Connection,
    Execution,
}

impl fmt::Display for ExecuteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecuteStep::Connection => f.write_str("connection"),
            ExecuteStep::Execution => f.write_str("execution"),
        }
    }
}

#[derive(Debug, Error)]
#[error("query execution failed at {step}: {message}")]
pub struct ExecutionError {
    pub step: ExecuteStep,
    pub message: String,
}

/// Runs exactly the given SQL against the target database and shapes the
/// result into rows/columns/count.
pub async fn execute(
    sql: &str,
    connection_string: &str,
) -> Result<QueryResult, ExecutionError> {
    let client = super::open_client(connection_string)
        .await
        .map_err(|e| ExecutionError {
            step: ExecuteStep::Connection,
            message: e.to_string(),
        })?;

    let statement = client.prepare(sql).await.map_err(|e| ExecutionError {
        step: ExecuteStep::Execution,
        message: e.to_string(),
    })?;

    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let pg_rows = client
        .query(&statement, &[])
        .await
        .map_err(|e| ExecutionError {
            step: ExecuteStep::Execution,
            message: e.to_string(),
        })?;

    let rows: Vec<Map<String, Value>> = pg_rows.iter().map(row_to_json).collect();
    let row_count = rows.len();

    debug!("Executed query, {} rows", row_count);

    Ok(QueryResult {
        rows,
        columns,
        row_count,
    })
}

fn row_to_json(row: &Row) -> Map<String, Value> {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), cell_to_json(row, idx, column.type_()));
    }
    map
}

/// Converts one cell to JSON by declared column type. Temporal values are
/// rendered as ISO strings so the visualization selector can recognize
/// them; types without a native mapping fall back to text and then NULL.
fn cell_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    match ty.name() {
        "bool" => opt_value(row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::from))),
        "int2" => opt_value(row.try_get::<_, Option<i16>>(idx).map(|v| v.map(Value::from))),
        "int4" => opt_value(row.try_get::<_, Option<i32>>(idx).map(|v| v.map(Value::from))),
        "int8" => opt_value(row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::from))),
        "float4" => opt_value(
            row.try_get::<_, Option<f32>>(idx)
                .map(|v| v.map(|f| Value::from(f as f64))),
        ),
        "float8" => opt_value(row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::from))),
        "text" | "varchar" | "bpchar" | "name" => opt_value(
            row.try_get::<_, Option<String>>(idx)
                .map(|v| v.map(Value::from)),
        ),
        "date" => opt_value(
            row.try_get::<_, Option<NaiveDate>>(idx)
                .map(|v| v.map(|d| Value::from(d.format("%Y-%m-%d").to_string()))),
        ),
        "time" => opt_value(
            row.try_get::<_, Option<NaiveTime>>(idx)
                .map(|v| v.map(|t| Value::from(t.format("%H:%M:%S").to_string()))),
        ),
        "timestamp" => opt_value(
            row.try_get::<_, Option<NaiveDateTime>>(idx)
                .map(|v| v.map(|t| Value::from(t.format("%Y-%m-%d %H:%M:%S").to_string()))),
        ),
        "timestamptz" => opt_value(
            row.try_get::<_, Option<DateTime<Utc>>>(idx)
                .map(|v| v.map(|t| Value::from(t.to_rfc3339()))),
        ),
        "uuid" => opt_value(
            row.try_get::<_, Option<uuid::Uuid>>(idx)
                .map(|v| v.map(|u| Value::from(u.to_string()))),
        ),
        "json" | "jsonb" => opt_value(row.try_get::<_, Option<Value>>(idx)),
        _ => {
            // NUMERIC and friends: try text, otherwise surface NULL.
            match row.try_get::<_, Option<String>>(idx) {
                Ok(Some(s)) => Value::String(s),
                Ok(None) => Value::Null,
                Err(e) => {
                    debug!("no JSON mapping for column type {}: {}", ty, e);
                    Value::Null
                }
            }
        }
    }
}

fn opt_value(result: Result<Option<Value>, tokio_postgres::Error>) -> Value {
    match result {
        Ok(Some(v)) => v,
        Ok(None) => Value::Null,
        Err(e) => {
            debug!("failed to read cell: {}", e);
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_serializes_camel_case() {
        let result = QueryResult {
            rows: vec![],
            columns: vec!["count".to_string()],
            row_count: 0,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rowCount"], 0);
        assert_eq!(json["columns"][0], "count");
    }

    #[tokio::test]
    async fn connection_failure_is_tagged() {
        // Port 9 (discard) is not running Postgres anywhere we test.
        let err = execute("SELECT 1", "postgres://u:p@127.0.0.1:9/db")
            .await
            .unwrap_err();
        assert_eq!(err.step, ExecuteStep::Connection);
    }
}
