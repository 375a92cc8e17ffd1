use axum::extract::{Path, Query, State};
use axum::Json;
use preset_core::controller::{ExecutionResult, StopPolicy, StopResult};
use preset_core::{ClientId, GroupId, Preset, PresetId, PresetStatus};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/presets: current status of every preset.
pub async fn list_statuses(
    State(app): State<AppState>,
) -> Result<Json<Vec<PresetStatus>>, AppError> {
    let statuses = app.orchestrator.statuses().await?;
    Ok(Json(statuses.iter().map(|s| PresetStatus::clone(s)).collect()))
}

/// GET /api/presets/{id}/status
pub async fn get_status(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PresetStatus>, AppError> {
    let status = app.orchestrator.status(&PresetId::from(id)).await?;
    Ok(Json(PresetStatus::clone(&status)))
}

#[derive(Debug, Deserialize)]
pub struct PresetBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_group_id: Option<GroupId>,
    #[serde(default)]
    pub client_commands: BTreeMap<ClientId, String>,
}

/// PUT /api/presets/{id}: create or replace a preset, then reconcile it.
pub async fn put_preset(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PresetBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let preset = Preset {
        id: PresetId::from(id),
        name: body.name,
        description: body.description,
        target_group_id: body.target_group_id,
        client_commands: body.client_commands,
    };
    let preset_id = preset.id.clone();
    let registry = app.registry.clone();
    let saved = preset.clone();
    tokio::task::spawn_blocking(move || registry.save_preset(saved))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    tracing::info!(preset_id = %preset_id, "preset saved");
    let status = app.orchestrator.on_preset_changed(&preset_id).await?;
    Ok(Json(serde_json::json!({
        "preset": preset,
        "status": &*status,
    })))
}

/// DELETE /api/presets/{id}: remove a preset and its status.
pub async fn delete_preset(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let preset_id = PresetId::from(id);
    let registry = app.registry.clone();
    let pid = preset_id.clone();
    tokio::task::spawn_blocking(move || registry.delete_preset(&pid))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    app.orchestrator.on_preset_deleted(&preset_id).await;
    tracing::info!(preset_id = %preset_id, "preset deleted");
    Ok(Json(serde_json::json!({ "deleted": preset_id })))
}

/// POST /api/presets/{id}/execute: start the preset on its target group.
pub async fn execute_preset(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResult>, AppError> {
    Ok(Json(app.orchestrator.start(&PresetId::from(id)).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StopQuery {
    #[serde(default)]
    pub require_active: bool,
}

/// POST /api/presets/{id}/stop: stop every client running the preset.
pub async fn stop_preset(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StopQuery>,
) -> Result<Json<StopResult>, AppError> {
    let policy = if query.require_active {
        StopPolicy::RequireActive
    } else {
        StopPolicy::Idempotent
    };
    Ok(Json(app.orchestrator.stop(&PresetId::from(id), policy).await?))
}
