use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::prompts::CONTEXT_GATHERING_PROMPT;
use super::runner::{run_tool_loop, LoopConfig};
use super::{AgentError, ToolFailure, ToolHandler};
use crate::db::introspect;
use crate::deps::AppDeps;
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, ToolSpec};
use crate::store::files::{FileError, UserFile};

/// History key for the context agent's threads.
const AGENT_NAME: &str = "context";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to load user files: {0}")]
    Files(#[from] FileError),
    #[error("context agent failed: {0}")]
    Agent(#[from] AgentError),
}

/// Natural-language schema summary produced by the agent.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub schema_context: String,
}

/// The context agent's fixed tool set, parsed into typed variants at the
/// dispatch boundary.
#[derive(Debug)]
enum ContextToolCall {
    GetTables,
    GetTableColumns { table_name: String },
}

impl ContextToolCall {
    fn parse(name: &str, arguments: &str) -> Result<Self, ToolFailure> {
        match name {
            "getTables" => Ok(ContextToolCall::GetTables),
            "getTableColumns" => {
                #[derive(Deserialize)]
                struct Args {
                    #[serde(rename = "tableName")]
                    table_name: String,
                }
                let args: Args = serde_json::from_str(arguments)
                    .map_err(|e| ToolFailure(format!("invalid arguments: {}", e)))?;
                Ok(ContextToolCall::GetTableColumns {
                    table_name: args.table_name,
                })
            }
            other => Err(ToolFailure(format!("unknown tool: {}", other))),
        }
    }
}

pub struct ContextTools {
    connection_string: String,
}

impl ContextTools {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for ContextTools {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::function(
                "getTables",
                "Retrieve all table names from the PostgreSQL database",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolSpec::function(
                "getTableColumns",
                "Retrieve all columns and their types for a specific table. Returns column name, \
                 data type, nullability, primary key status, and foreign key relationships.",
                json!({
                    "type": "object",
                    "properties": {
                        "tableName": {
                            "type": "string",
                            "description": "The name of the table to inspect"
                        }
                    },
                    "required": ["tableName"]
                }),
            ),
        ]
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: &str,
        _cancel: &CancellationToken,
    ) -> Result<Value, ToolFailure> {
        match ContextToolCall::parse(name, arguments)? {
            ContextToolCall::GetTables => {
                let tables = introspect::list_tables(&self.connection_string)
                    .await
                    .map_err(|e| ToolFailure(e.to_string()))?;
                Ok(json!({ "tables": tables }))
            }
            ContextToolCall::GetTableColumns { table_name } => {
                let columns = introspect::list_columns(&self.connection_string, &table_name)
                    .await
                    .map_err(|e| ToolFailure(e.to_string()))?;
                Ok(json!({ "columns": columns }))
            }
        }
    }
}

/// Explores the database schema for one user question, persisting the
/// conversation under `(context, thread_id)`.
///
/// Prior turns are prepended, uploaded file references of the user are
/// attached to the new turn, and the full sequence (minus the system
/// instruction) is written back when the agent finishes. No retry here;
/// retrying is the workflow's job.
pub async fn gather_context(
    deps: &AppDeps,
    connection_string: &str,
    user_query: &str,
    user_id: &str,
    thread_id: &str,
    cancel: &CancellationToken,
) -> Result<SchemaContext, ContextError> {
    let files = deps.files.list_for_user(user_id).await?;
    let history = deps.history.get(AGENT_NAME, thread_id).await;

    info!(
        "gathering schema context (thread {}, {} prior messages)",
        thread_id,
        history.messages.len()
    );

    let mut messages = Vec::with_capacity(history.messages.len() + 3);
    messages.push(ChatMessage::system(CONTEXT_GATHERING_PROMPT));
    messages.extend(history.messages);
    messages.push(ChatMessage::user(format!(
        r#"User Query: "{}"

<instructions>
For extra context about the user's database and its business, the user may also attach some files with this message.
Please explore the database schema to gather context for generating a SQL query to answer this question.
Start by getting the list of tables, then inspect the relevant tables to understand their structure and relationships.
</instructions>"#,
        user_query
    )));
    if !files.is_empty() {
        messages.push(ChatMessage::user_parts(file_parts(&files)));
    }

    let tools = ContextTools::new(connection_string);
    let outcome = run_tool_loop(
        &deps.llm,
        LoopConfig {
            model: &deps.config.llm.context_model,
            max_steps: deps.config.agent.context_steps,
            temperature: 0.1,
        },
        &tools,
        messages,
        cancel,
    )
    .await?;

    // Persist everything but the system instruction. A lost race against a
    // concurrent turn on the same thread only costs history, not the answer.
    let to_store: Vec<ChatMessage> = outcome
        .messages
        .into_iter()
        .filter(|m| m.role != "system")
        .collect();
    if let Err(e) = deps
        .history
        .put(AGENT_NAME, thread_id, to_store, history.version)
        .await
    {
        warn!("could not persist context thread {}: {}", thread_id, e);
    }

    Ok(SchemaContext {
        schema_context: outcome.text,
    })
}

/// Ad hoc schema exploration without thread history or file grounding.
/// Backs the generator agent's getContext tool, so a parent loop can
/// delegate to a bounded child loop with the same cancellation token.
pub async fn explore_schema(
    deps: &AppDeps,
    connection_string: &str,
    user_query: &str,
    cancel: &CancellationToken,
) -> Result<String, ContextError> {
    let messages = vec![
        ChatMessage::system(CONTEXT_GATHERING_PROMPT),
        ChatMessage::user(format!(
            "Please explore the database schema to understand how to answer this query: \"{}\"",
            user_query
        )),
    ];

    let tools = ContextTools::new(connection_string);
    let outcome = run_tool_loop(
        &deps.llm,
        LoopConfig {
            model: &deps.config.llm.context_model,
            max_steps: deps.config.agent.context_steps,
            temperature: 0.1,
        },
        &tools,
        messages,
        cancel,
    )
    .await?;

    Ok(outcome.text)
}

fn file_parts(files: &[UserFile]) -> Vec<ContentPart> {
    files
        .iter()
        .map(|f| {
            if f.media_type.starts_with("image/") {
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: f.url.clone() },
                }
            } else {
                ContentPart::Text {
                    text: format!("Attached file ({}): {}", f.media_type, f.url),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_tables_call() {
        assert!(matches!(
            ContextToolCall::parse("getTables", "{}"),
            Ok(ContextToolCall::GetTables)
        ));
    }

    #[test]
    fn parses_get_table_columns_call() {
        let call = ContextToolCall::parse("getTableColumns", r#"{"tableName":"users"}"#).unwrap();
        match call {
            ContextToolCall::GetTableColumns { table_name } => assert_eq!(table_name, "users"),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_tool_and_bad_arguments() {
        assert!(ContextToolCall::parse("dropTables", "{}").is_err());
        assert!(ContextToolCall::parse("getTableColumns", "not json").is_err());
    }

    #[test]
    fn image_files_become_image_parts() {
        let files = vec![
            UserFile {
                kind: "file".to_string(),
                url: "https://files.test/erd.png".to_string(),
                media_type: "image/png".to_string(),
            },
            UserFile {
                kind: "file".to_string(),
                url: "https://files.test/glossary.pdf".to_string(),
                media_type: "application/pdf".to_string(),
            },
        ];

        let parts = file_parts(&files);
        assert!(matches!(parts[0], ContentPart::ImageUrl { .. }));
        assert!(matches!(parts[1], ContentPart::Text { .. }));
    }
}
