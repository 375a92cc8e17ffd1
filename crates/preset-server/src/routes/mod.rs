pub mod clients;
pub mod events;
pub mod groups;
pub mod presets;

use axum::Json;

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
