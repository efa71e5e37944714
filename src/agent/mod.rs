pub mod context;
pub mod generator;
pub mod prompts;
pub mod runner;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::types::ToolSpec;
use crate::llm::LlmError;

/// A tool call failed in a way the model should hear about. The message
/// is surfaced as the tool result so the model itself can decide to retry
/// or compensate; it does not abort the loop.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ToolFailure(pub String);

impl From<String> for ToolFailure {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Dispatch surface of one agent's fixed tool set.
///
/// Implementations parse the call into a typed variant at this boundary;
/// there is exactly one place where model-produced JSON becomes host
/// types.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    async fn dispatch(
        &self,
        name: &str,
        arguments: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ToolFailure>;
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(LlmError),
    #[error("step budget of {0} exhausted before a final answer")]
    StepBudget(usize),
    #[error("agent run cancelled")]
    Cancelled,
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => AgentError::Cancelled,
            other => AgentError::Llm(other),
        }
    }
}
