//! Read-side projections over persisted run checkpoints.
//!
//! Each collection holds one checkpoint slot (latest run wins), so these
//! views describe the most recent run per collection together with simple
//! aggregates. They read straight from the store and never touch live run
//! state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::domain::{DecisionRecord, RunCheckpoint};
use crate::error::Result;
use crate::persistence::CheckpointStore;

const CHECKPOINT_PREFIX: &str = "checkpoint_";

/// A decision annotated with the run and collection it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionView {
    pub collection_id: String,
    pub run_id: String,
    #[serde(flatten)]
    pub decision: DecisionRecord,
}

/// Aggregates over the latest checkpoint of every collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub collections_tracked: usize,
    pub decisions_recorded: usize,
    pub votes_submitted: usize,
    pub errors_recorded: usize,
    pub pending_attestations: usize,
    /// Decision counts keyed by choice name.
    pub choice_counts: HashMap<String, usize>,
    /// Latest phase per collection.
    pub phases: HashMap<String, String>,
}

pub struct RunProjections {
    store: CheckpointStore,
}

impl RunProjections {
    pub fn new(store: CheckpointStore) -> Self {
        Self { store }
    }

    async fn load_checkpoints(&self) -> Result<Vec<RunCheckpoint>> {
        let mut out = Vec::new();
        for key in self.store.list_keys(CHECKPOINT_PREFIX).await? {
            match self.store.load::<RunCheckpoint>(&key).await {
                Ok(Some(cp)) => out.push(cp),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "skipping unreadable checkpoint"),
            }
        }
        Ok(out)
    }

    /// Most recent decisions across all collections, newest first, capped at
    /// `limit`.
    pub async fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionView>> {
        let mut views: Vec<DecisionView> = Vec::new();
        for cp in self.load_checkpoints().await? {
            for decision in &cp.decisions {
                views.push(DecisionView {
                    collection_id: cp.collection_id.clone(),
                    run_id: cp.run_id.clone(),
                    decision: decision.clone(),
                });
            }
        }
        views.sort_by(|a, b| b.decision.timestamp.cmp(&a.decision.timestamp));
        views.truncate(limit);
        Ok(views)
    }

    pub async fn statistics(&self) -> Result<RunStatistics> {
        let mut stats = RunStatistics::default();
        for cp in self.load_checkpoints().await? {
            stats.collections_tracked += 1;
            stats.decisions_recorded += cp.decisions.len();
            stats.votes_submitted += cp.decisions.iter().filter(|d| d.submitted).count();
            stats.errors_recorded += cp.errors.len();
            stats.pending_attestations += cp.pending_attestation_ids.len();
            for decision in &cp.decisions {
                *stats
                    .choice_counts
                    .entry(decision.choice.to_string())
                    .or_insert(0) += 1;
            }
            stats
                .phases
                .insert(cp.collection_id.clone(), cp.phase.phase_name().to_string());
        }
        Ok(stats)
    }
}
