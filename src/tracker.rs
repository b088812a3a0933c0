//! State-transition tracking with bounded history and oscillation detection.
//!
//! The tracker owns the orchestrator's current phase plus a bounded FIFO of
//! transition records, persisted atomically after every mutation. All
//! mutation and query paths share one critical section per instance, so
//! interleaved writers can never produce a torn history file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::TrackerConfig;
use crate::domain::RunPhase;
use crate::error::{AgentError, Result};
use crate::persistence::CheckpointStore;

const STORE_KEY: &str = "transitions";

/// A single recorded phase transition. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RunPhase,
    pub to: RunPhase,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Aggregate view over the transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSummary {
    pub total_transitions: usize,
    pub current_phase: RunPhase,
    pub phase_counts: HashMap<String, u64>,
    pub error_entries: u64,
    pub mean_seconds_between: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackerFile {
    current_phase: RunPhase,
    last_transition_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
}

#[derive(Debug)]
struct TrackerState {
    current: RunPhase,
    last_transition_at: Option<DateTime<Utc>>,
    history: VecDeque<TransitionRecord>,
    transitioning_fast: bool,
}

pub struct StateTransitionTracker {
    capacity: usize,
    fast_threshold_secs: f64,
    store: CheckpointStore,
    inner: Mutex<TrackerState>,
}

impl StateTransitionTracker {
    /// Restore the tracker from its persisted history, or start at IDLE with
    /// an empty history when no (valid) file exists.
    pub async fn load(store: CheckpointStore, config: &TrackerConfig) -> Result<Self> {
        let state = match store.load::<TrackerFile>(STORE_KEY).await? {
            Some(file) => {
                let mut history: VecDeque<TransitionRecord> = file.history.into();
                while history.len() > config.history_capacity {
                    history.pop_front();
                }
                if file.current_phase != RunPhase::Idle {
                    // A non-idle persisted phase means the process died
                    // mid-run; a restarted agent always resumes at idle.
                    info!(
                        phase = %file.current_phase,
                        "restored mid-run transition history, resuming at idle"
                    );
                }
                TrackerState {
                    current: RunPhase::Idle,
                    last_transition_at: file.last_transition_at,
                    history,
                    transitioning_fast: false,
                }
            }
            None => TrackerState {
                current: RunPhase::Idle,
                last_transition_at: None,
                history: VecDeque::new(),
                transitioning_fast: false,
            },
        };

        Ok(Self {
            capacity: config.history_capacity,
            fast_threshold_secs: config.fast_threshold_secs,
            store,
            inner: Mutex::new(state),
        })
    }

    /// Record a transition to `to`, evicting the oldest history entry at
    /// capacity and persisting the updated history before returning.
    ///
    /// Rejects edges outside the fixed transition graph; a transition to the
    /// current phase is recorded but never flags fast oscillation.
    pub async fn transition(
        &self,
        to: RunPhase,
        metadata: HashMap<String, String>,
    ) -> Result<TransitionRecord> {
        let mut state = self.inner.lock().await;
        let from = state.current;

        if to != from && !from.can_transition_to(to) {
            return Err(AgentError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        if to != from {
            let fast = match state.last_transition_at {
                Some(prev) => {
                    let delta = (now - prev).num_milliseconds() as f64 / 1000.0;
                    delta < self.fast_threshold_secs
                }
                None => false,
            };
            state.transitioning_fast = fast;
        }

        let record = TransitionRecord {
            from,
            to,
            timestamp: now,
            metadata,
        };

        state.current = to;
        state.last_transition_at = Some(now);
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(record.clone());

        info!(from = %from, to = %to, "phase transition");

        self.persist(&state).await?;
        Ok(record)
    }

    pub async fn current_phase(&self) -> RunPhase {
        self.inner.lock().await.current
    }

    /// Seconds since the most recent transition, or `None` before the first.
    pub async fn seconds_since_last_transition(&self) -> Option<f64> {
        let state = self.inner.lock().await;
        state
            .last_transition_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
    }

    pub async fn is_transitioning_fast(&self) -> bool {
        self.inner.lock().await.transitioning_fast
    }

    /// The most recent `n` transitions, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<TransitionRecord> {
        let state = self.inner.lock().await;
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Mean seconds between consecutive transitions; 0 with fewer than two
    /// entries, never a division by zero.
    pub async fn mean_seconds_between(&self) -> f64 {
        let state = self.inner.lock().await;
        Self::mean_of(&state.history)
    }

    pub async fn summary(&self) -> TransitionSummary {
        let state = self.inner.lock().await;
        let mut phase_counts: HashMap<String, u64> = HashMap::new();
        let mut error_entries = 0u64;
        for record in &state.history {
            *phase_counts.entry(record.to.to_string()).or_default() += 1;
            if record.to == RunPhase::Error {
                error_entries += 1;
            }
        }
        TransitionSummary {
            total_transitions: state.history.len(),
            current_phase: state.current,
            phase_counts,
            error_entries,
            mean_seconds_between: Self::mean_of(&state.history),
        }
    }

    pub fn fast_threshold_secs(&self) -> f64 {
        self.fast_threshold_secs
    }

    pub fn history_capacity(&self) -> usize {
        self.capacity
    }

    fn mean_of(history: &VecDeque<TransitionRecord>) -> f64 {
        if history.len() < 2 {
            return 0.0;
        }
        let first = history.front().map(|r| r.timestamp);
        let last = history.back().map(|r| r.timestamp);
        match (first, last) {
            (Some(first), Some(last)) => {
                let span = (last - first).num_milliseconds() as f64 / 1000.0;
                span / (history.len() - 1) as f64
            }
            _ => 0.0,
        }
    }

    async fn persist(&self, state: &TrackerState) -> Result<()> {
        let file = TrackerFile {
            current_phase: state.current,
            last_transition_at: state.last_transition_at,
            history: state.history.iter().cloned().collect(),
        };
        self.store.save(STORE_KEY, &file).await
    }
}
