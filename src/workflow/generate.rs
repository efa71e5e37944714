use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::retry::{retry_with_timeout, RetryPolicy};
use super::{WorkflowError, WorkflowStage};
use crate::agent::context::gather_context;
use crate::agent::generator::{self, SqlGeneratorInput, SqlGeneratorOutput};
use crate::deps::AppDeps;

#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub user_id: String,
    pub user_prompt: String,
    pub thread_id: String,
    pub connection_id: Option<String>,
}

/// Runs the generation pipeline: resolve connection, gather schema
/// context, generate a tested SQL query. Stages are strictly sequential;
/// each one's output is required input to the next, and each retried
/// stage is bounded by the shared attempt cap and timeout.
pub async fn run(
    deps: &Arc<AppDeps>,
    input: GenerateInput,
    cancel: &CancellationToken,
) -> Result<SqlGeneratorOutput, WorkflowError> {
    let connection_string =
        super::resolve_connection(deps, &input.user_id, input.connection_id.as_deref()).await?;

    let policy = RetryPolicy::from(&deps.config.retry);

    let context = retry_with_timeout(policy, || {
        let deps = Arc::clone(deps);
        let connection_string = connection_string.clone();
        let input = input.clone();
        let cancel = cancel.clone();
        async move {
            gather_context(
                &deps,
                &connection_string,
                &input.user_prompt,
                &input.user_id,
                &input.thread_id,
                &cancel,
            )
            .await
        }
    })
    .await
    .map_err(|e| WorkflowError::at(WorkflowStage::GenerateContext, e))?;

    info!(
        "schema context gathered ({} chars)",
        context.schema_context.len()
    );

    let output = retry_with_timeout(policy, || {
        let deps = Arc::clone(deps);
        let generator_input = SqlGeneratorInput {
            connection_string: connection_string.clone(),
            user_id: input.user_id.clone(),
            context: context.schema_context.clone(),
            user_query: input.user_prompt.clone(),
        };
        let cancel = cancel.clone();
        async move { generator::generate(&deps, generator_input, &cancel).await }
    })
    .await
    .map_err(|e| WorkflowError::at(WorkflowStage::GenerateSql, e))?;

    info!("generated SQL query ({} chars)", output.query.len());
    Ok(output)
}
