pub mod types;

use crate::config::LlmConfig;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use types::{ChatMessage, ChatRequest, ChatResponse};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    Connection(String),
    #[error("LLM response error: {0}")]
    Response(String),
    #[error("LLM configuration error: {0}")]
    Config(String),
    #[error("LLM call cancelled")]
    Cancelled,
}

/// Client for an OpenRouter/OpenAI-compatible chat-completions endpoint.
///
/// Built once at startup and passed by reference into every component that
/// talks to the model; there is no ambient global client.
pub struct LlmClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Config("API key is required".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        })
    }

    /// Sends one chat request and returns the assistant message of the first
    /// choice. Aborts promptly when `cancel` fires, so nested agent calls do
    /// not complete orphaned work.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage, LlmError> {
        debug!("Sending chat request to model {}", request.model);

        let send = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            resp = send => resp.map_err(|e| LlmError::Connection(e.to_string()))?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Response(format!(
                "API responded with status code: {} - {}",
                status, body
            )));
        }

        let parsed: ChatResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            body = response.json::<ChatResponse>() => {
                body.map_err(|e| LlmError::Response(e.to_string()))?
            }
        };

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Response("No choices in response".to_string()))?;

        Ok(choice.message)
    }
}
