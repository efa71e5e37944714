use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

use sqlpilot::config::AppConfig;
use sqlpilot::deps::AppDeps;
use sqlpilot::llm::LlmClient;
use sqlpilot::store::connections::ConnectionRegistry;
use sqlpilot::store::files::MemoryFileRegistry;
use sqlpilot::store::history::MemoryHistoryStore;

/// Replays a fixed sequence of chat-completion bodies, one per request;
/// the last body repeats if the agent asks again.
pub struct SequenceResponder {
    bodies: Vec<Value>,
    counter: AtomicUsize,
}

impl SequenceResponder {
    pub fn new(bodies: Vec<Value>) -> Self {
        Self {
            bodies,
            counter: AtomicUsize::new(0),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let idx = self.counter.fetch_add(1, Ordering::SeqCst);
        let body = self
            .bodies
            .get(idx)
            .or_else(|| self.bodies.last())
            .cloned()
            .unwrap_or_else(|| json!({ "choices": [] }));
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// A chat response carrying only final assistant text.
pub fn text_response(text: &str) -> Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": text }
        }]
    })
}

/// A chat response proposing a single tool call.
pub fn tool_call_response(name: &str, arguments: &str) -> Value {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments }
                }]
            }
        }]
    })
}

pub struct TestEnv {
    pub deps: Arc<AppDeps>,
    pub history: Arc<MemoryHistoryStore>,
    pub files: Arc<MemoryFileRegistry>,
}

/// Builds dependencies wired to a mock chat endpoint and in-memory
/// storage, with fast retries so failure tests stay quick.
pub fn test_env(llm_uri: &str, connections: Arc<dyn ConnectionRegistry>) -> TestEnv {
    let mut config = AppConfig::default();
    config.llm.api_url = format!("{}/v1/chat/completions", llm_uri);
    config.llm.api_key = Some("test-key".to_string());
    config.llm.request_timeout_secs = 5;
    config.retry.base_ms = 1;
    config.retry.max_attempts = 2;
    config.retry.timeout_secs = 10;

    let llm = LlmClient::new(&config.llm).expect("client config");
    let history = Arc::new(MemoryHistoryStore::new());
    let files = Arc::new(MemoryFileRegistry::new());

    let deps = Arc::new(AppDeps {
        llm,
        connections,
        history: history.clone(),
        files: files.clone(),
        config,
    });

    TestEnv {
        deps,
        history,
        files,
    }
}
