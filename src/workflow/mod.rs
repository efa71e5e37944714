pub mod execute;
pub mod generate;
pub mod retry;

use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::deps::AppDeps;
use retry::{retry_with_timeout, RetryPolicy};

/// Which stage of a workflow gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Validation,
    GetConnection,
    Execution,
    GenerateContext,
    GenerateSql,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            WorkflowStage::Validation => "validation",
            WorkflowStage::GetConnection => "get_connection",
            WorkflowStage::Execution => "execution",
            WorkflowStage::GenerateContext => "generate_context",
            WorkflowStage::GenerateSql => "generate_sql",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Error)]
#[error("workflow stage {stage} failed: {message}")]
pub struct WorkflowError {
    pub stage: WorkflowStage,
    pub message: String,
}

impl WorkflowError {
    pub fn at(stage: WorkflowStage, message: impl fmt::Display) -> Self {
        Self {
            stage,
            message: message.to_string(),
        }
    }
}

/// Resolves the target connection string: by id when one is given,
/// otherwise the user's first Postgres-sourced connection. Wrapped in the
/// shared retry/timeout discipline; exhaustion surfaces as a
/// `get_connection`-tagged error, never a raw registry error.
pub(crate) async fn resolve_connection(
    deps: &AppDeps,
    user_id: &str,
    connection_id: Option<&str>,
) -> Result<String, WorkflowError> {
    let policy = RetryPolicy::from(&deps.config.retry);

    let resolved = retry_with_timeout(policy, || {
        let registry = std::sync::Arc::clone(&deps.connections);
        let connection_id = connection_id.map(|s| s.to_string());
        let user_id = user_id.to_string();
        async move {
            match connection_id {
                Some(id) => registry.get_by_id(&id).await,
                None => registry
                    .list_pg_connections_for_user(&user_id)
                    .await
                    .map(|mut list| list.remove(0)),
            }
        }
    })
    .await
    .map_err(|e| WorkflowError::at(WorkflowStage::GetConnection, e))?;

    debug!("resolved connection {}", resolved.id);
    Ok(resolved.connection_string)
}
