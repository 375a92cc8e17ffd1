use axum::extract::{Path, State};
use axum::Json;
use preset_core::{ClientId, Group, GroupId};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MembersBody {
    pub members: Vec<ClientId>,
}

/// PUT /api/groups/{id}/members: replace group membership.
pub async fn put_members(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MembersBody>,
) -> Result<Json<Group>, AppError> {
    let group_id = GroupId::from(id);
    let registry = app.registry.clone();
    let gid = group_id.clone();
    let group = tokio::task::spawn_blocking(move || registry.set_members(&gid, body.members))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    app.orchestrator.on_group_membership_changed(&group_id);
    Ok(Json(group))
}
