use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::llm::types::ChatMessage;

/// Content of the synthetic message returned for threads that were never
/// written.
pub const EMPTY_THREAD_PLACEHOLDER: &str = "no message history.";

/// A thread's stored messages plus the version to present on the next
/// write. Writers that lost a race get a stale-write error instead of
/// silently clobbering the other turn.
#[derive(Debug, Clone)]
pub struct ThreadHistory {
    pub messages: Vec<ChatMessage>,
    pub version: u64,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("stale write for {agent}:{thread_id}: expected version {expected}, found {actual}")]
    StaleWrite {
        agent: String,
        thread_id: String,
        expected: u64,
        actual: u64,
    },
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Never fails and never returns an empty sequence: an unknown thread
    /// yields exactly one placeholder user message at version 0.
    async fn get(&self, agent: &str, thread_id: &str) -> ThreadHistory;

    /// Full overwrite of the thread. `expected_version` must match the
    /// version returned by the `get` that started this turn.
    async fn put(
        &self,
        agent: &str,
        thread_id: &str,
        messages: Vec<ChatMessage>,
        expected_version: u64,
    ) -> Result<(), HistoryError>;
}

fn key(agent: &str, thread_id: &str) -> String {
    format!("{}:{}", agent, thread_id)
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    threads: RwLock<HashMap<String, (u64, Vec<ChatMessage>)>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(&self, agent: &str, thread_id: &str) -> ThreadHistory {
        match self.threads.read().await.get(&key(agent, thread_id)) {
            Some((version, messages)) => ThreadHistory {
                messages: messages.clone(),
                version: *version,
            },
            None => ThreadHistory {
                messages: vec![ChatMessage::user(EMPTY_THREAD_PLACEHOLDER)],
                version: 0,
            },
        }
    }

    async fn put(
        &self,
        agent: &str,
        thread_id: &str,
        messages: Vec<ChatMessage>,
        expected_version: u64,
    ) -> Result<(), HistoryError> {
        let mut threads = self.threads.write().await;
        let entry = threads.entry(key(agent, thread_id)).or_insert((0, Vec::new()));

        if entry.0 != expected_version {
            return Err(HistoryError::StaleWrite {
                agent: agent.to_string(),
                thread_id: thread_id.to_string(),
                expected: expected_version,
                actual: entry.0,
            });
        }

        entry.0 += 1;
        entry.1 = messages;
        Ok(())
    }
}
