use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::state::AppState;
use crate::workflow;
use crate::workflow::execute::{ExecuteInput, ExecuteResult};
use crate::workflow::generate::GenerateInput;
use crate::workflow::WorkflowStage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_prompt: String,
    pub thread_id: String,
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_visualization: Option<crate::viz::VizKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub sql: String,
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
}

/// The authenticating proxy in front of this service supplies the user id.
fn user_id_from_headers(headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                "missing x-user-id header".to_string(),
            )
        })
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<GenerateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user_id = user_id_from_headers(&headers)?;
    info!("generate request (thread {})", payload.thread_id);

    let cancel = CancellationToken::new();
    let output = workflow::generate::run(
        &state.deps,
        GenerateInput {
            user_id,
            user_prompt: payload.user_prompt,
            thread_id: payload.thread_id,
            connection_id: payload.connection_id,
        },
        &cancel,
    )
    .await
    .map_err(|e| {
        let status = match e.stage {
            WorkflowStage::GetConnection => StatusCode::NOT_FOUND,
            WorkflowStage::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
    })?;

    Ok(Json(GenerateResponse {
        query: output.query,
        confidence: output.confidence,
        suggested_visualization: output.suggested_visualization,
    }))
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResult>, (StatusCode, String)> {
    let user_id = user_id_from_headers(&headers)?;
    info!("execute request: {}", payload.sql);

    let result = workflow::execute::run(
        &state.deps,
        ExecuteInput {
            user_id,
            sql: payload.sql,
            connection_id: payload.connection_id,
        },
    )
    .await;

    // Failures come back as a structured payload, not an error status.
    Ok(Json(result))
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let uptime = chrono::Utc::now() - state.startup_time;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds(),
    })
}
