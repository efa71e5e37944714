use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::explore_schema;
use super::prompts::SQL_GENERATOR_PROMPT;
use super::runner::{run_tool_loop, LoopConfig};
use super::{AgentError, ToolFailure, ToolHandler};
use crate::db::validate::{apply_limit, validate};
use crate::db::{executor, introspect};
use crate::deps::AppDeps;
use crate::llm::types::{ChatMessage, ToolSpec};
use crate::viz::VizKind;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("sql generation agent failed: {0}")]
    Agent(#[from] AgentError),
    #[error("could not parse agent output: {0}")]
    OutputParse(String),
}

#[derive(Debug, Clone)]
pub struct SqlGeneratorInput {
    pub connection_string: String,
    pub user_id: String,
    pub context: String,
    pub user_query: String,
}

/// The agent's final structured answer. Confidence and the visualization
/// hint are optional; the query is not.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlGeneratorOutput {
    pub query: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub suggested_visualization: Option<VizKind>,
}

/// Tool set of the SQL generation agent: introspection, delegation to a
/// nested context agent, and live self-testing of candidate queries.
#[derive(Debug)]
enum GeneratorToolCall {
    GetTables,
    GetColumns { table_name: String },
    GetContext { user_query: String },
    TestQuery { query: String },
}

impl GeneratorToolCall {
    fn parse(name: &str, arguments: &str) -> Result<Self, ToolFailure> {
        #[derive(Deserialize)]
        struct TableArgs {
            #[serde(rename = "tableName")]
            table_name: String,
        }
        #[derive(Deserialize)]
        struct QueryArgs {
            #[serde(rename = "userQuery")]
            user_query: String,
        }
        #[derive(Deserialize)]
        struct SqlArgs {
            query: String,
        }

        let bad_args = |e: serde_json::Error| ToolFailure(format!("invalid arguments: {}", e));

        match name {
            "getTables" => Ok(GeneratorToolCall::GetTables),
            "getColumns" => {
                let args: TableArgs = serde_json::from_str(arguments).map_err(bad_args)?;
                Ok(GeneratorToolCall::GetColumns {
                    table_name: args.table_name,
                })
            }
            "getContext" => {
                let args: QueryArgs = serde_json::from_str(arguments).map_err(bad_args)?;
                Ok(GeneratorToolCall::GetContext {
                    user_query: args.user_query,
                })
            }
            "testQuery" => {
                let args: SqlArgs = serde_json::from_str(arguments).map_err(bad_args)?;
                Ok(GeneratorToolCall::TestQuery { query: args.query })
            }
            other => Err(ToolFailure(format!("unknown tool: {}", other))),
        }
    }
}

pub struct GeneratorTools {
    deps: Arc<AppDeps>,
    connection_string: String,
}

impl GeneratorTools {
    pub fn new(deps: Arc<AppDeps>, connection_string: impl Into<String>) -> Self {
        Self {
            deps,
            connection_string: connection_string.into(),
        }
    }

    /// Executes a candidate query with a forced LIMIT 1 cap and reports
    /// pass/fail plus the error text, never an Err: a failing test is a
    /// normal result the model must react to.
    async fn test_query(&self, query: &str) -> Value {
        if let Err(e) = validate(query) {
            return json!({ "testPassed": false, "error": e.to_string(), "query": query });
        }

        let capped = apply_limit(query, 1);
        match executor::execute(&capped, &self.connection_string).await {
            Ok(_) => json!({ "testPassed": true, "query": query }),
            Err(e) => json!({ "testPassed": false, "error": e.to_string(), "query": query }),
        }
    }
}

#[async_trait]
impl ToolHandler for GeneratorTools {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::function(
                "getTables",
                "Retrieve all table names from the PostgreSQL database",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolSpec::function(
                "getColumns",
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
            ToolSpec::function(
                "getContext",
                "Delegate to a specialized context agent to explore the database schema in depth. \
                 Use this when you need additional schema information beyond the provided context, \
                 especially when dealing with errors or complex queries.",
                json!({
                    "type": "object",
                    "properties": {
                        "userQuery": {
                            "type": "string",
                            "description": "The user query to gather context for"
                        }
                    },
                    "required": ["userQuery"]
                }),
            ),
            ToolSpec::function(
                "testQuery",
                "Test a generated SQL query by executing it (with LIMIT 1 for safety). Returns \
                 whether the test passed and any error message if it failed. YOU MUST CALL THIS \
                 TOOL AND RECEIVE A PASSING RESULT BEFORE OUTPUTTING YOUR FINAL ANSWER.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The SQL query to test"
                        }
                    },
                    "required": ["query"]
                }),
            ),
        ]
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolFailure> {
        match GeneratorToolCall::parse(name, arguments)? {
            GeneratorToolCall::GetTables => {
                let tables = introspect::list_tables(&self.connection_string)
                    .await
                    .map_err(|e| ToolFailure(e.to_string()))?;
                Ok(json!({ "tables": tables }))
            }
            GeneratorToolCall::GetColumns { table_name } => {
                let columns = introspect::list_columns(&self.connection_string, &table_name)
                    .await
                    .map_err(|e| ToolFailure(e.to_string()))?;
                Ok(json!({ "columns": columns }))
            }
            GeneratorToolCall::GetContext { user_query } => {
                // Agent delegation: a full nested context-agent run, sharing
                // this loop's cancellation token.
                let context =
                    explore_schema(&self.deps, &self.connection_string, &user_query, cancel)
                        .await
                        .map_err(|e| ToolFailure(e.to_string()))?;
                Ok(json!({ "context": context }))
            }
            GeneratorToolCall::TestQuery { query } => Ok(self.test_query(&query).await),
        }
    }
}

/// Runs the SQL generation agent to a tested query.
///
/// The loop gets a larger step budget than the context agent so it can go
/// through several test/repair cycles. There is no partial-credit output:
/// either the final text parses into a query, or the caller's retry policy
/// re-invokes the whole agent.
pub async fn generate(
    deps: &Arc<AppDeps>,
    input: SqlGeneratorInput,
    cancel: &CancellationToken,
) -> Result<SqlGeneratorOutput, GenerationError> {
    info!("generating SQL for user {}", input.user_id);

    let messages = vec![
        ChatMessage::system(SQL_GENERATOR_PROMPT),
        ChatMessage::user(format!(
            r#"## Context (Database Schema):
{}

## User Query:
"{}"

## Instructions:
Generate a SQL query to answer the user's question. Remember to:
1. Use the provided context as your primary schema reference
2. Test your query using the testQuery tool
3. Only output the final result when the test passes
4. If the test fails, analyze the error and retry with fixes or additional context gathering"#,
            input.context, input.user_query
        )),
    ];

    let tools = GeneratorTools::new(Arc::clone(deps), input.connection_string.clone());
    let outcome = run_tool_loop(
        &deps.llm,
        LoopConfig {
            model: &deps.config.llm.model,
            max_steps: deps.config.agent.generator_steps,
            temperature: 0.1,
        },
        &tools,
        messages,
        cancel,
    )
    .await?;

    let output = parse_output(&outcome.text)?;
    debug!("generated query: {}", output.query);
    Ok(output)
}

/// Parses the agent's final text into the structured output, once, at
/// this boundary. Tolerates a fenced code block around the JSON.
fn parse_output(text: &str) -> Result<SqlGeneratorOutput, GenerationError> {
    let body = strip_code_fence(text);

    let output: SqlGeneratorOutput = serde_json::from_str(body)
        .map_err(|e| GenerationError::OutputParse(format!("{} in: {}", e, text)))?;

    if output.query.trim().is_empty() {
        return Err(GenerationError::OutputParse(
            "agent returned an empty query".to_string(),
        ));
    }

    Ok(output)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.rsplit_once("```")
        .map(|(body, _)| body.trim())
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_output() {
        let output =
            parse_output(r#"{"query": "SELECT u.id FROM users u LIMIT 20", "confidence": 0.9}"#)
                .unwrap();
        assert_eq!(output.query, "SELECT u.id FROM users u LIMIT 20");
        assert_eq!(output.confidence, Some(0.9));
        assert!(output.suggested_visualization.is_none());
    }

    #[test]
    fn parses_fenced_json_output() {
        let text = "```json\n{\"query\": \"SELECT 1\", \"suggestedVisualization\": \"bar\"}\n```";
        let output = parse_output(text).unwrap();
        assert_eq!(output.query, "SELECT 1");
        assert_eq!(output.suggested_visualization, Some(VizKind::Bar));
    }

    #[test]
    fn rejects_free_text_output() {
        assert!(matches!(
            parse_output("Here is your query: SELECT 1"),
            Err(GenerationError::OutputParse(_))
        ));
    }

    #[test]
    fn rejects_empty_query() {
        assert!(parse_output(r#"{"query": "  "}"#).is_err());
    }

    #[test]
    fn parses_tool_calls_into_typed_variants() {
        assert!(matches!(
            GeneratorToolCall::parse("getTables", "{}"),
            Ok(GeneratorToolCall::GetTables)
        ));
        assert!(matches!(
            GeneratorToolCall::parse("testQuery", r#"{"query":"SELECT 1"}"#),
            Ok(GeneratorToolCall::TestQuery { .. })
        ));
        assert!(GeneratorToolCall::parse("runShell", "{}").is_err());
    }
}
