pub mod error;
pub mod executor;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Presets
        .route("/api/presets", get(routes::presets::list_statuses))
        .route(
            "/api/presets/{id}",
            put(routes::presets::put_preset).delete(routes::presets::delete_preset),
        )
        .route(
            "/api/presets/{id}/status",
            get(routes::presets::get_status),
        )
        .route(
            "/api/presets/{id}/execute",
            post(routes::presets::execute_preset),
        )
        .route("/api/presets/{id}/stop", post(routes::presets::stop_preset))
        // Connectivity feed
        .route(
            "/api/clients/{id}/state",
            post(routes::clients::report_state),
        )
        // Groups
        .route(
            "/api/groups/{id}/members",
            put(routes::groups::put_members),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the preset server.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the preset server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting.
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("preset server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
