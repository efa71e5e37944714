mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

use common::{test_env, text_response, SequenceResponder};
use sqlpilot::db::validate::validate;
use sqlpilot::store::connections::{
    ConnectionRegistry, MemoryConnectionRegistry, NewConnection,
};
use sqlpilot::store::history::HistoryStore;
use sqlpilot::workflow;
use sqlpilot::workflow::execute::ExecuteInput;
use sqlpilot::workflow::generate::GenerateInput;
use sqlpilot::workflow::WorkflowStage;

async fn registry_with_connection(connection_string: &str) -> Arc<MemoryConnectionRegistry> {
    let registry = Arc::new(MemoryConnectionRegistry::new());
    registry
        .create(NewConnection {
            user_id: "u1".to_string(),
            connection_string: connection_string.to_string(),
            source: "postgres".to_string(),
        })
        .await
        .unwrap();
    registry
}

#[tokio::test]
async fn generation_workflow_yields_a_tested_select() {
    let server = MockServer::start().await;

    // First call: the context agent summarizes the schema. Second call:
    // the generator returns its structured answer.
    let generator_answer = serde_json::json!({
        "query": "SELECT COUNT(u.id) AS signup_count FROM users u \
                  WHERE u.created_at >= date_trunc('month', CURRENT_DATE) - INTERVAL '1 month' \
                  AND u.created_at < date_trunc('month', CURRENT_DATE)",
        "confidence": 0.9,
        "suggestedVisualization": "table"
    })
    .to_string();

    Mock::given(method("POST"))
        .respond_with(SequenceResponder::new(vec![
            text_response(
                "The database has a users table with columns id (uuid, primary key) and \
                 created_at (timestamp, not null).",
            ),
            text_response(&generator_answer),
        ]))
        .mount(&server)
        .await;

    let registry = registry_with_connection("postgres://target.invalid/db").await;
    let env = test_env(&server.uri(), registry);

    let output = workflow::generate::run(
        &env.deps,
        GenerateInput {
            user_id: "u1".to_string(),
            user_prompt: "how many users signed up last month".to_string(),
            thread_id: "t1".to_string(),
            connection_id: None,
        },
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(output.query.to_uppercase().contains("COUNT"));
    assert!(output.query.contains("created_at"));
    assert!(validate(&output.query).is_ok());

    // The context conversation was persisted for the thread.
    let thread = env.history.get("context", "t1").await;
    assert_eq!(thread.version, 1);
    assert!(thread.messages.iter().any(|m| m.role == "assistant"));
}

#[tokio::test]
async fn unresolvable_connection_surfaces_as_get_connection_stage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(SequenceResponder::new(vec![text_response("unused")]))
        .mount(&server)
        .await;

    // Registry is empty: every resolution attempt fails.
    let env = test_env(&server.uri(), Arc::new(MemoryConnectionRegistry::new()));

    let err = workflow::generate::run(
        &env.deps,
        GenerateInput {
            user_id: "nobody".to_string(),
            user_prompt: "anything".to_string(),
            thread_id: "t1".to_string(),
            connection_id: None,
        },
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.stage, WorkflowStage::GetConnection);
    // No model call happens before the connection resolves.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn execute_workflow_rejects_unsafe_sql_without_retry() {
    let server = MockServer::start().await;
    let env = test_env(&server.uri(), Arc::new(MemoryConnectionRegistry::new()));

    let result = workflow::execute::run(
        &env.deps,
        ExecuteInput {
            user_id: "u1".to_string(),
            sql: "DROP TABLE users".to_string(),
            connection_id: None,
        },
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.sql, "DROP TABLE users");
    let message = result.error.as_ref().unwrap().message.clone();
    assert!(message.contains("validation"));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], false);
    assert!(json.get("data").is_none());
}

#[tokio::test]
async fn execute_workflow_tags_unreachable_database_as_execution_failure() {
    let server = MockServer::start().await;
    // Port 9 refuses Postgres connections; execution fails on every attempt.
    let registry = registry_with_connection("postgres://u:p@127.0.0.1:9/db").await;
    let env = test_env(&server.uri(), registry);

    let result = workflow::execute::run(
        &env.deps,
        ExecuteInput {
            user_id: "u1".to_string(),
            sql: "SELECT id FROM users".to_string(),
            connection_id: None,
        },
    )
    .await;

    assert!(!result.success);
    let message = result.error.as_ref().unwrap().message.clone();
    assert!(message.contains("execution"));
}

#[tokio::test]
async fn execute_workflow_resolves_explicit_connection_id() {
    let server = MockServer::start().await;
    let registry = Arc::new(MemoryConnectionRegistry::new());
    let connection = registry
        .create(NewConnection {
            user_id: "u1".to_string(),
            connection_string: "postgres://u:p@127.0.0.1:9/db".to_string(),
            source: "postgres".to_string(),
        })
        .await
        .unwrap();
    let env = test_env(&server.uri(), registry);

    // An unknown id fails at connection resolution, not execution.
    let result = workflow::execute::run(
        &env.deps,
        ExecuteInput {
            user_id: "u1".to_string(),
            sql: "SELECT id FROM users".to_string(),
            connection_id: Some("does-not-exist".to_string()),
        },
    )
    .await;
    assert!(!result.success);
    assert!(result
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("get_connection"));

    // The real id gets past resolution (and then fails at the dead port).
    let result = workflow::execute::run(
        &env.deps,
        ExecuteInput {
            user_id: "u1".to_string(),
            sql: "SELECT id FROM users".to_string(),
            connection_id: Some(connection.id),
        },
    )
    .await;
    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().message.contains("execution"));
}
