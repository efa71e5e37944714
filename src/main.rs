use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use sqlpilot::config::{AppConfig, CliArgs};
use sqlpilot::deps::AppDeps;
use sqlpilot::llm::LlmClient;
use sqlpilot::store::connections::PgConnectionRegistry;
use sqlpilot::store::files::PgFileRegistry;
use sqlpilot::store::history::MemoryHistoryStore;
use sqlpilot::util::logging::init_tracing;
use sqlpilot::web;
use sqlpilot::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing LLM client for {}", config.llm.api_url);
    let llm = LlmClient::new(&config.llm)?;

    let registry_db = config.registry.connection_string.clone();
    let deps = Arc::new(AppDeps {
        llm,
        connections: Arc::new(PgConnectionRegistry::new(registry_db.clone())),
        history: Arc::new(MemoryHistoryStore::new()),
        files: Arc::new(PgFileRegistry::new(registry_db)),
        config: config.clone(),
    });

    let app_state = Arc::new(AppState::new(deps));

    // Start the web server
    info!(
        "Starting sqlpilot server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}
