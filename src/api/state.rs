use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::activity::ActivityLedger;
use crate::attestation::AttestationQueue;
use crate::health::HealthAggregator;
use crate::orchestrator::RunOrchestrator;
use crate::projections::RunProjections;
use crate::tracker::StateTransitionTracker;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RunOrchestrator>,
    pub tracker: Arc<StateTransitionTracker>,
    pub ledger: Arc<ActivityLedger>,
    pub queue: Arc<AttestationQueue>,
    pub health: Arc<HealthAggregator>,
    pub projections: Arc<RunProjections>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
