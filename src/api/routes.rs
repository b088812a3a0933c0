use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoint: always 200, degraded states live in the body
        .route("/healthcheck", get(handlers::get_health))
        // Run endpoints
        .route("/agent-run", post(handlers::trigger_run))
        .route("/agent-run/status", get(handlers::get_run_status))
        .route("/agent-run/decisions", get(handlers::get_decisions))
        .route("/agent-run/statistics", get(handlers::get_statistics))
        // Activity endpoints
        .route("/activity/nonces", get(handlers::get_nonces))
        .route(
            "/activity/eligibility/:chain",
            get(handlers::get_eligibility),
        )
        .route("/activity/status", get(handlers::get_activity_status))
        // Attestation endpoints
        .route("/attestations/dead-letter", get(handlers::get_dead_letter))
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
