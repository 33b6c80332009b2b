use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{SourceConfig, SyncAction, SyncSettings, VaultConfig};
use crate::errors::Error;
use crate::pipeline::{Pipeline, RunSummary};
use crate::planner::DiffPolicy;

use super::error::ApiError;
use super::ControlState;

/// Body of `POST /api/v1/{list,copy,mirror}`
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub source: VaultConfig,
    #[serde(default)]
    pub destination: Option<VaultConfig>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub kv_root: Option<String>,
    #[serde(default)]
    pub diff_policy: Option<DiffPolicy>,
}

impl ActionRequest {
    /// Overlay the request on the server defaults.
    pub fn into_settings(self, action: SyncAction, defaults: &SyncSettings) -> SyncSettings {
        SyncSettings {
            action,
            workers: self.workers.unwrap_or(defaults.workers),
            source: SourceConfig::Vault(self.source),
            destination: self.destination,
            kv_root: self.kv_root.or_else(|| defaults.kv_root.clone()),
            diff_policy: self.diff_policy.unwrap_or(defaults.diff_policy),
            list_output_file: defaults.list_output_file.clone(),
            max_depth: defaults.max_depth,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub busy: bool,
}

pub async fn health_handler(State(state): State<ControlState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: crate::VERSION, busy: state.guard.is_busy() })
}

fn pipeline_for(
    state: &ControlState,
    action: SyncAction,
    request: ActionRequest,
) -> Result<Pipeline, Error> {
    let settings = request.into_settings(action, &state.defaults);
    let source = match &settings.source {
        SourceConfig::Vault(config) => Some(state.connectors.connector(config)),
        SourceConfig::File(_) => None,
    };
    let destination = settings.destination.as_ref().map(|config| state.connectors.connector(config));
    Pipeline::new(settings, source, destination)
}

pub async fn list_handler(
    State(state): State<ControlState>,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    let _permit = state.guard.try_acquire().ok_or(ApiError::Busy)?;

    let summary = pipeline_for(&state, SyncAction::List, request)?.run().await?;
    let output_file = summary
        .output_file
        .clone()
        .ok_or_else(|| ApiError::Internal("list produced no snapshot file".to_string()))?;
    let body = tokio::fs::read_to_string(&output_file).await.map_err(Error::from)?;

    let status = if summary.is_success() { StatusCode::OK } else { StatusCode::MULTI_STATUS };

    info!(keys = summary.source_keys, failed = summary.report.failed(), "List served");
    Ok((status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

async fn run_copy(
    state: ControlState,
    action: SyncAction,
    request: ActionRequest,
) -> Result<(StatusCode, Json<RunSummary>), ApiError> {
    let _permit = state.guard.try_acquire().ok_or(ApiError::Busy)?;

    let summary = pipeline_for(&state, action, request)?.run().await?;
    let status = if summary.is_success() { StatusCode::OK } else { StatusCode::MULTI_STATUS };

    info!(%action, copied = summary.report.copied(), failed = summary.report.failed(), "Action served");
    Ok((status, Json(summary)))
}

pub async fn copy_handler(
    State(state): State<ControlState>,
    Json(request): Json<ActionRequest>,
) -> Result<(StatusCode, Json<RunSummary>), ApiError> {
    run_copy(state, SyncAction::Copy, request).await
}

pub async fn mirror_handler(
    State(state): State<ControlState>,
    Json(request): Json<ActionRequest>,
) -> Result<(StatusCode, Json<RunSummary>), ApiError> {
    run_copy(state, SyncAction::Mirror, request).await
}
