use serde::{Deserialize, Serialize};

/// POST /agent-run request body.
#[derive(Debug, Deserialize)]
pub struct TriggerRunRequest {
    pub collection_id: String,
    /// Execute all stages but skip vote submission and attestation.
    #[serde(default)]
    pub dry_run: bool,
}

/// GET /agent-run/status response.
#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub is_active: bool,
    pub current_phase: String,
    pub seconds_since_last_transition: Option<f64>,
    pub uptime_secs: i64,
}

/// GET /activity/eligibility/:chain response.
#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub chain: String,
    pub period_seconds: u64,
    pub is_live: bool,
}

/// Error body shared by all non-2xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub category: String,
}
