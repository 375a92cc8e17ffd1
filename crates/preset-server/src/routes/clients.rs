use axum::extract::{Path, State};
use axum::Json;
use preset_core::{ClientId, ClientState};

use crate::state::AppState;

/// POST /api/clients/{id}/state: connectivity feed push.
///
/// Body is a client state report; `updated_at` defaults to now.
pub async fn report_state(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(state): Json<ClientState>,
) -> Json<serde_json::Value> {
    let client_id = ClientId::from(id);
    let changed = app.orchestrator.on_client_state_changed(&client_id, state);
    if changed {
        tracing::debug!(client_id = %client_id, "client state changed");
    }
    Json(serde_json::json!({ "client_id": client_id, "changed": changed }))
}
