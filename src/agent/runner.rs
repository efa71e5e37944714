use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AgentError, ToolHandler};
use crate::llm::types::{ChatMessage, ChatRequest, ToolCall};
use crate::llm::LlmClient;

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig<'a> {
    pub model: &'a str,
    pub max_steps: usize,
    pub temperature: f32,
}

/// What a finished loop hands back: the final assistant text and the full
/// message sequence (suitable for persisting as thread history).
#[derive(Debug)]
pub struct AgentOutcome {
    pub text: String,
    pub messages: Vec<ChatMessage>,
}

/// Drives a model/tool loop to completion.
///
/// Each step sends the conversation, executes any proposed tool calls
/// (concurrently within the step; the model only sees results once all
/// have resolved), and appends the results. Terminates on the first
/// response without tool calls, or fails once the step budget runs out.
pub async fn run_tool_loop(
    llm: &LlmClient,
    config: LoopConfig<'_>,
    tools: &dyn ToolHandler,
    mut messages: Vec<ChatMessage>,
    cancel: &CancellationToken,
) -> Result<AgentOutcome, AgentError> {
    let specs = tools.specs();

    for step in 0..config.max_steps {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let request = ChatRequest {
            model: config.model.to_string(),
            messages: messages.clone(),
            tools: if specs.is_empty() {
                None
            } else {
                Some(specs.clone())
            },
            temperature: config.temperature,
        };

        let reply = llm.chat(&request, cancel).await?;
        let tool_calls = reply.tool_calls.clone().unwrap_or_default();
        messages.push(reply);

        if tool_calls.is_empty() {
            let text = messages
                .last()
                .map(|m| m.text())
                .unwrap_or_default();
            debug!("agent loop finished after {} steps", step + 1);
            return Ok(AgentOutcome { text, messages });
        }

        let results = join_all(
            tool_calls
                .iter()
                .map(|call| execute_call(tools, call, cancel)),
        )
        .await;

        for (call, result) in tool_calls.iter().zip(results) {
            messages.push(ChatMessage::tool(call.id.clone(), result));
        }
    }

    Err(AgentError::StepBudget(config.max_steps))
}

async fn execute_call(
    tools: &dyn ToolHandler,
    call: &ToolCall,
    cancel: &CancellationToken,
) -> String {
    debug!("executing tool call {}", call.function.name);

    match tools
        .dispatch(&call.function.name, &call.function.arguments, cancel)
        .await
    {
        Ok(value) => value.to_string(),
        Err(failure) => {
            // The model is part of the recovery loop: it sees the failure
            // as a tool result and can retry or compensate.
            warn!("tool {} failed: {}", call.function.name, failure);
            json!({ "error": failure.0 }).to_string()
        }
    }
}
