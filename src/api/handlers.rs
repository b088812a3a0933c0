use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::error;

use crate::activity::{ActivityStatus, NonceVector, LIVENESS_WINDOW_SECS};
use crate::api::{state::AppState, types::*};
use crate::domain::AttestationRecord;
use crate::error::AgentError;
use crate::health::HealthSnapshot;
use crate::orchestrator::RunSummary;
use crate::projections::{DecisionView, RunStatistics};

fn internal_error(err: AgentError) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
            category: err.category().to_string(),
        }),
    )
}

/// GET /healthcheck -- always 200; degraded subsystems are reported in the
/// body, never as an HTTP failure.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.health.get_health().await)
}

/// POST /agent-run -- trigger a run; 409 while another run is active.
pub async fn trigger_run(
    State(state): State<AppState>,
    Json(req): Json<TriggerRunRequest>,
) -> std::result::Result<Json<RunSummary>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .orchestrator
        .trigger_run(&req.collection_id, req.dry_run)
        .await
    {
        Ok(summary) => Ok(Json(summary)),
        Err(err @ AgentError::RunActive(_)) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: err.to_string(),
                category: err.category().to_string(),
            }),
        )),
        Err(err @ AgentError::Validation(_)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
                category: err.category().to_string(),
            }),
        )),
        Err(err) => Err(internal_error(err)),
    }
}

/// GET /agent-run/status
pub async fn get_run_status(State(state): State<AppState>) -> Json<RunStatusResponse> {
    Json(RunStatusResponse {
        is_active: state.orchestrator.is_active(),
        current_phase: state.tracker.current_phase().await.as_str().to_string(),
        seconds_since_last_transition: state.tracker.seconds_since_last_transition().await,
        uptime_secs: state.uptime_seconds(),
    })
}

#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    #[serde(default = "default_decision_limit")]
    pub limit: usize,
}

fn default_decision_limit() -> usize {
    20
}

/// GET /agent-run/decisions
pub async fn get_decisions(
    State(state): State<AppState>,
    Query(query): Query<DecisionsQuery>,
) -> std::result::Result<Json<Vec<DecisionView>>, (StatusCode, Json<ErrorResponse>)> {
    state
        .projections
        .recent_decisions(query.limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// GET /agent-run/statistics
pub async fn get_statistics(
    State(state): State<AppState>,
) -> std::result::Result<Json<RunStatistics>, (StatusCode, Json<ErrorResponse>)> {
    state
        .projections
        .statistics()
        .await
        .map(Json)
        .map_err(internal_error)
}

#[derive(Debug, Deserialize)]
pub struct NoncesQuery {
    pub chain: Option<String>,
}

/// GET /activity/nonces -- nonce vectors, either one chain or all tracked
/// chains. An unknown chain reads as all zeros by design.
pub async fn get_nonces(
    State(state): State<AppState>,
    Query(query): Query<NoncesQuery>,
) -> Json<std::collections::HashMap<String, NonceVector>> {
    let mut out = std::collections::HashMap::new();
    match query.chain {
        Some(chain) => {
            let vector = state.ledger.nonce_vector(&chain).await;
            out.insert(chain, vector);
        }
        None => {
            for chain in state.ledger.chains() {
                out.insert(chain.clone(), state.ledger.nonce_vector(chain).await);
            }
        }
    }
    Json(out)
}

/// GET /activity/eligibility/:chain
pub async fn get_eligibility(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> Json<EligibilityResponse> {
    let is_live = state.ledger.is_live(&chain, LIVENESS_WINDOW_SECS).await;
    Json(EligibilityResponse {
        chain,
        period_seconds: LIVENESS_WINDOW_SECS,
        is_live,
    })
}

/// GET /activity/status
pub async fn get_activity_status(State(state): State<AppState>) -> Json<ActivityStatus> {
    Json(state.ledger.status().await)
}

/// GET /attestations/dead-letter
pub async fn get_dead_letter(State(state): State<AppState>) -> Json<Vec<AttestationRecord>> {
    Json(state.queue.dead_letter().await)
}
