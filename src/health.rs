//! Health aggregation for the external liveness supervisor.
//!
//! `get_health` serves a cached snapshot under a short TTL and otherwise
//! recomputes by fanning out three read-only probes concurrently, each under
//! its own timeout. A probe that fails or times out degrades to its own
//! documented default; the aggregator itself never returns an error, because
//! its consumer is an automated liveness monitor.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::activity::{ActivityLedger, LIVENESS_WINDOW_SECS};
use crate::collaborators::ConnectivityProbe;
use crate::config::{HealthConfig, OrchestratorConfig};
use crate::tracker::{StateTransitionTracker, TransitionRecord, TransitionSummary};


/// Per-probe result collected by the fan-in step. No error may cross the
/// aggregation boundary; failures collapse to the probe's safe default.
enum ProbeResult<T> {
    Ok(T),
    Failed,
    TimedOut,
}

impl<T> ProbeResult<T> {
    fn unwrap_or(self, default: T) -> T {
        match self {
            ProbeResult::Ok(v) => v,
            ProbeResult::Failed | ProbeResult::TimedOut => default,
        }
    }
}

/// Activity-side health booleans; each defaults to false on probe failure.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActivityHealth {
    pub is_submitting_on_chain: bool,
    pub is_liveness_kpi_met: bool,
    pub has_required_resources: bool,
}

/// Fully derived health snapshot. Never persisted; cached for the TTL only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Seconds since the last phase transition; -1 before the first one.
    pub seconds_since_last_transition: f64,
    pub is_transitioning_fast: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_pause_duration: Option<f64>,
    /// False on connectivity probe failure or timeout.
    pub is_chain_healthy: bool,
    pub activity_health: ActivityHealth,
    /// Empty on tracker probe failure.
    pub recent_transitions: Vec<TransitionRecord>,
    pub transition_summary: Option<TransitionSummary>,
}

impl HealthSnapshot {
    fn safe_default() -> Self {
        Self {
            seconds_since_last_transition: -1.0,
            is_transitioning_fast: false,
            period: None,
            reset_pause_duration: None,
            is_chain_healthy: false,
            activity_health: ActivityHealth::default(),
            recent_transitions: Vec::new(),
            transition_summary: None,
        }
    }
}

struct TrackerReport {
    seconds_since_last_transition: f64,
    is_transitioning_fast: bool,
    period: u64,
    reset_pause_duration: f64,
    recent_transitions: Vec<TransitionRecord>,
    summary: TransitionSummary,
}

pub struct HealthAggregator {
    cache_ttl: Duration,
    probe_timeout: Duration,
    attestation_chain: String,
    agent_address: String,
    probe: Arc<dyn ConnectivityProbe>,
    ledger: Arc<ActivityLedger>,
    tracker: Arc<StateTransitionTracker>,
    cache: Mutex<Option<(Instant, HealthSnapshot)>>,
}

impl HealthAggregator {
    pub fn new(
        health: &HealthConfig,
        orchestrator: &OrchestratorConfig,
        probe: Arc<dyn ConnectivityProbe>,
        ledger: Arc<ActivityLedger>,
        tracker: Arc<StateTransitionTracker>,
    ) -> Self {
        Self {
            cache_ttl: Duration::from_secs(health.cache_ttl_secs),
            probe_timeout: Duration::from_millis(health.probe_timeout_ms),
            attestation_chain: orchestrator.attestation_chain.clone(),
            agent_address: orchestrator.agent_address.clone(),
            probe,
            ledger,
            tracker,
            cache: Mutex::new(None),
        }
    }

    /// Cached snapshot while fresh, otherwise a recompute. One critical
    /// section spans check -> recompute -> store so concurrent callers never
    /// race a stale cache against a fresh one.
    pub async fn get_health(&self) -> HealthSnapshot {
        let mut cache = self.cache.lock().await;
        if let Some((at, snapshot)) = cache.as_ref() {
            if at.elapsed() < self.cache_ttl {
                debug!("serving cached health snapshot");
                return snapshot.clone();
            }
        }
        let snapshot = self.recompute().await;
        *cache = Some((Instant::now(), snapshot.clone()));
        snapshot
    }

    async fn recompute(&self) -> HealthSnapshot {
        let (chain, activity, tracker) = tokio::join!(
            self.probe_chain(),
            self.probe_activity(),
            self.probe_tracker(),
        );

        let mut snapshot = HealthSnapshot::safe_default();
        snapshot.is_chain_healthy = chain.unwrap_or(false);
        snapshot.activity_health = activity.unwrap_or(ActivityHealth::default());
        if let ProbeResult::Ok(report) = tracker {
            snapshot.seconds_since_last_transition = report.seconds_since_last_transition;
            snapshot.is_transitioning_fast = report.is_transitioning_fast;
            snapshot.period = Some(report.period);
            snapshot.reset_pause_duration = Some(report.reset_pause_duration);
            snapshot.recent_transitions = report.recent_transitions;
            snapshot.transition_summary = Some(report.summary);
        }
        snapshot
    }

    async fn probe_chain(&self) -> ProbeResult<bool> {
        match tokio::time::timeout(self.probe_timeout, self.probe.check()).await {
            Ok(Ok(healthy)) => ProbeResult::Ok(healthy),
            Ok(Err(e)) => {
                debug!(error = %e, "connectivity probe failed");
                ProbeResult::Failed
            }
            Err(_) => {
                debug!("connectivity probe timed out");
                ProbeResult::TimedOut
            }
        }
    }

    async fn probe_activity(&self) -> ProbeResult<ActivityHealth> {
        let chain = self.attestation_chain.clone();
        let fut = async {
            let nonces = self.ledger.nonce_vector(&chain).await;
            let on_chain = nonces[crate::activity::NONCE_MULTISIG_ACTIVITY]
                + nonces[crate::activity::NONCE_VOTE_ATTESTATION];
            ActivityHealth {
                is_submitting_on_chain: on_chain > 0,
                is_liveness_kpi_met: self.ledger.is_live(&chain, LIVENESS_WINDOW_SECS).await,
                has_required_resources: !self.agent_address.is_empty(),
            }
        };
        match tokio::time::timeout(self.probe_timeout, fut).await {
            Ok(health) => ProbeResult::Ok(health),
            Err(_) => {
                debug!("activity probe timed out");
                ProbeResult::TimedOut
            }
        }
    }

    async fn probe_tracker(&self) -> ProbeResult<TrackerReport> {
        let fut = async {
            TrackerReport {
                seconds_since_last_transition: self
                    .tracker
                    .seconds_since_last_transition()
                    .await
                    .unwrap_or(-1.0),
                is_transitioning_fast: self.tracker.is_transitioning_fast().await,
                period: self.tracker.history_capacity() as u64,
                reset_pause_duration: self.tracker.fast_threshold_secs(),
                recent_transitions: self.tracker.recent(10).await,
                summary: self.tracker.summary().await,
            }
        };
        match tokio::time::timeout(self.probe_timeout, fut).await {
            Ok(report) => ProbeResult::Ok(report),
            Err(_) => {
                debug!("tracker probe timed out");
                ProbeResult::TimedOut
            }
        }
    }
}
