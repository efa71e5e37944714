use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::retry::{retry_with_timeout, RetryPolicy};
use super::{WorkflowError, WorkflowStage};
use crate::db::executor;
use crate::db::validate::{ensure_limit, validate};
use crate::deps::AppDeps;
use crate::viz::{self, VisualizationConfig};

#[derive(Debug, Clone)]
pub struct ExecuteInput {
    pub user_id: String,
    pub sql: String,
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteData {
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ExecuteFailure {
    pub message: String,
}

/// Terminal payload of the execution workflow. Failures are folded in as
/// a structured object rather than thrown past the boundary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub success: bool,
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExecuteData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecuteFailure>,
}

/// Runs the execution pipeline: validate, limit, resolve connection,
/// execute, visualize. A linear state machine with no branching beyond
/// retry; visualization is best-effort and never fails the request.
pub async fn run(deps: &AppDeps, input: ExecuteInput) -> ExecuteResult {
    match run_stages(deps, &input).await {
        Ok(result) => result,
        Err(e) => {
            warn!("execute workflow failed: {}", e);
            ExecuteResult {
                success: false,
                sql: input.sql,
                data: None,
                visualization: None,
                error: Some(ExecuteFailure {
                    message: e.to_string(),
                }),
            }
        }
    }
}

async fn run_stages(deps: &AppDeps, input: &ExecuteInput) -> Result<ExecuteResult, WorkflowError> {
    // Validation is deterministic for a given input: reject immediately,
    // no retry.
    validate(&input.sql).map_err(|e| WorkflowError::at(WorkflowStage::Validation, e))?;
    let sql = ensure_limit(&input.sql);

    let connection_string =
        super::resolve_connection(deps, &input.user_id, input.connection_id.as_deref()).await?;

    let policy = RetryPolicy::from(&deps.config.retry);
    let query_result = retry_with_timeout(policy, || {
        let sql = sql.clone();
        let connection_string = connection_string.clone();
        async move { executor::execute(&sql, &connection_string).await }
    })
    .await
    .map_err(|e| WorkflowError::at(WorkflowStage::Execution, e))?;

    info!(
        "executed query, {} rows, {} columns",
        query_result.row_count,
        query_result.columns.len()
    );

    let visualization = viz::select(&query_result.columns, &query_result.rows);

    Ok(ExecuteResult {
        success: true,
        sql,
        data: Some(ExecuteData {
            rows: query_result.rows,
            columns: query_result.columns,
            row_count: query_result.row_count,
        }),
        visualization: Some(visualization),
        error: None,
    })
}
