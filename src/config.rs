use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Chat-completions endpoint (OpenRouter or any OpenAI-compatible API).
    pub api_url: String,
    pub api_key: Option<String>,
    /// Model used by the SQL generation agent.
    pub model: String,
    /// Cheaper model used by the schema context agent.
    pub context_model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Connection string of the application database holding the
    /// connection registry.
    pub connection_string: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Base backoff interval in milliseconds; doubles per attempt.
    pub base_ms: u64,
    pub max_attempts: u32,
    /// Overall ceiling per retried workflow stage, in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Step budget for the schema context agent.
    pub context_steps: usize,
    /// Step budget for the SQL generation agent; larger to allow several
    /// test/repair cycles.
    pub generator_steps: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub registry: RegistryConfig,
    pub retry: RetryConfig,
    pub agent: AgentConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Connection string of the application database
    #[arg(long)]
    pub registry_db: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/sqlpilot/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(registry_db) = &args.registry_db {
            config.registry.connection_string = registry_db.clone();
        }

        // The API key normally arrives via the environment, not the file.
        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("OPENROUTER_API_KEY").ok();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                api_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
                api_key: None,
                model: "openai/gpt-4o".to_string(),
                context_model: "openai/gpt-4o-mini".to_string(),
                request_timeout_secs: 120,
            },
            registry: RegistryConfig {
                connection_string: "postgres://localhost/sqlpilot".to_string(),
            },
            retry: RetryConfig {
                base_ms: 200,
                max_attempts: 5,
                timeout_secs: 600,
            },
            agent: AgentConfig {
                context_steps: 20,
                generator_steps: 30,
            },
        }
    }
}
