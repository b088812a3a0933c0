//! Run checkpoint payloads.
//!
//! Each run persists one checkpoint per collection slot, rewritten before
//! every stage. The phase payload is a tagged union carrying only the fields
//! relevant to that phase; `schema_version` supports forward migration of
//! files written by older builds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{VoteChoice, VoteDecision};

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Phase-specific checkpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseCheckpoint {
    Starting,
    LoadingPreferences,
    FetchingCandidates,
    FilteringCandidates {
        total_candidates: usize,
    },
    Analyzing {
        candidate_id: String,
    },
    Deciding {
        candidate_id: String,
    },
    Submitting {
        decisions_to_submit: usize,
    },
    Completed {
        votes_cast: usize,
        duration_ms: u64,
    },
    Error {
        stage: String,
        category: String,
    },
}

impl PhaseCheckpoint {
    pub fn phase_name(&self) -> &'static str {
        match self {
            PhaseCheckpoint::Starting => "starting",
            PhaseCheckpoint::LoadingPreferences => "loading_preferences",
            PhaseCheckpoint::FetchingCandidates => "fetching_candidates",
            PhaseCheckpoint::FilteringCandidates { .. } => "filtering_candidates",
            PhaseCheckpoint::Analyzing { .. } => "analyzing",
            PhaseCheckpoint::Deciding { .. } => "deciding",
            PhaseCheckpoint::Submitting { .. } => "submitting",
            PhaseCheckpoint::Completed { .. } => "completed",
            PhaseCheckpoint::Error { .. } => "error",
        }
    }
}

/// One error captured during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub stage: String,
    pub category: String,
    pub message: String,
}

/// A decision recorded into the checkpoint after submission (or dry-run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub candidate_id: String,
    pub choice: VoteChoice,
    pub confidence: f64,
    pub rationale: String,
    pub submitted: bool,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn from_decision(decision: &VoteDecision, submitted: bool) -> Self {
        Self {
            candidate_id: decision.candidate_id.clone(),
            choice: decision.choice,
            confidence: decision.confidence,
            rationale: decision.rationale.clone(),
            submitted,
            timestamp: Utc::now(),
        }
    }
}

/// Persisted snapshot of a run's progress.
///
/// Superseded wholesale by the next run against the same collection; a
/// reader never observes a half-written checkpoint (atomic replace in the
/// store layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub schema_version: u32,
    pub run_id: String,
    pub collection_id: String,
    pub phase: PhaseCheckpoint,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
    #[serde(default)]
    pub pending_attestation_ids: Vec<Uuid>,
    #[serde(default)]
    pub errors: Vec<RunError>,
}

impl RunCheckpoint {
    pub fn new(run_id: impl Into<String>, collection_id: impl Into<String>, dry_run: bool) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            run_id: run_id.into(),
            collection_id: collection_id.into(),
            phase: PhaseCheckpoint::Starting,
            started_at: Utc::now(),
            dry_run,
            decisions: Vec::new(),
            pending_attestation_ids: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Store key for the checkpoint slot of a collection.
    pub fn store_key(collection_id: &str) -> String {
        format!("checkpoint_{collection_id}")
    }

    pub fn record_error(&mut self, stage: &str, category: &str, message: impl Into<String>) {
        self.errors.push(RunError {
            stage: stage.to_string(),
            category: category.to_string(),
            message: message.into(),
        });
    }
}
