use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::LlmClient;
use crate::store::connections::ConnectionRegistry;
use crate::store::files::FileRegistry;
use crate::store::history::HistoryStore;

/// Everything the agents and workflows depend on, constructed once at
/// process start and passed by reference. No ambient singletons.
pub struct AppDeps {
    pub config: AppConfig,
    pub llm: LlmClient,
    pub connections: Arc<dyn ConnectionRegistry>,
    pub history: Arc<dyn HistoryStore>,
    pub files: Arc<dyn FileRegistry>,
}
