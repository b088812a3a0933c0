//! Core domain types shared across the orchestrator and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A governance proposal candidate fetched from the candidate source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub collection_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Voting window close, if the source reports one.
    pub end_time: Option<DateTime<Utc>>,
}

/// Vote choice on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl VoteChoice {
    /// Numeric choice encoding used by the chain submitter.
    pub fn as_choice_index(&self) -> u8 {
        match self {
            VoteChoice::For => 1,
            VoteChoice::Against => 2,
            VoteChoice::Abstain => 3,
        }
    }
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteChoice::For => write!(f, "for"),
            VoteChoice::Against => write!(f, "against"),
            VoteChoice::Abstain => write!(f, "abstain"),
        }
    }
}

/// Output of the decision engine for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteDecision {
    pub candidate_id: String,
    pub choice: VoteChoice,
    /// Confidence in [0, 1]; decisions below the configured threshold are
    /// not submitted.
    pub confidence: f64,
    pub rationale: String,
}

/// Voting strategy selected by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

/// Operator preferences loaded at the start of each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub strategy: VotingStrategy,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_items_per_run")]
    pub max_items_per_run: usize,
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_max_items_per_run() -> usize {
    3
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            strategy: VotingStrategy::Balanced,
            confidence_threshold: default_confidence_threshold(),
            max_items_per_run: default_max_items_per_run(),
            allowlist: Vec::new(),
            denylist: Vec::new(),
        }
    }
}

/// Lifecycle status of an attestation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Pending,
    Submitted,
    Failed,
}

/// A record asserting that a vote was cast, destined for on-chain submission.
///
/// Created when a vote succeeds; removed from the pending list once
/// SUBMITTED; parked on the dead-letter list once FAILED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub id: Uuid,
    pub proposal_id: String,
    pub collection_id: String,
    /// Chain the attestation targets; drives per-chain submission ordering.
    pub chain: String,
    pub agent_address: String,
    pub choice: VoteChoice,
    /// Opaque reference returned by the vote submission (tx hash or similar).
    pub vote_reference: String,
    pub run_id: String,
    pub confidence: f64,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub status: AttestationStatus,
}

impl AttestationRecord {
    pub fn new(
        proposal_id: impl Into<String>,
        collection_id: impl Into<String>,
        chain: impl Into<String>,
        agent_address: impl Into<String>,
        choice: VoteChoice,
        vote_reference: impl Into<String>,
        run_id: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_id: proposal_id.into(),
            collection_id: collection_id.into(),
            chain: chain.into(),
            agent_address: agent_address.into(),
            choice,
            vote_reference: vote_reference.into(),
            run_id: run_id.into(),
            confidence,
            retry_count: 0,
            created_at: Utc::now(),
            status: AttestationStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_index_encoding() {
        assert_eq!(VoteChoice::For.as_choice_index(), 1);
        assert_eq!(VoteChoice::Against.as_choice_index(), 2);
        assert_eq!(VoteChoice::Abstain.as_choice_index(), 3);
    }

    #[test]
    fn test_new_attestation_starts_pending() {
        let rec = AttestationRecord::new(
            "prop-1", "space-1", "base", "0xagent", VoteChoice::For, "0xtx", "run-1", 0.9,
        );
        assert_eq!(rec.status, AttestationStatus::Pending);
        assert_eq!(rec.retry_count, 0);
    }

    #[test]
    fn test_preferences_defaults() {
        let prefs = Preferences::default();
        assert_eq!(prefs.strategy, VotingStrategy::Balanced);
        assert!(prefs.confidence_threshold > 0.0);
        assert_eq!(prefs.max_items_per_run, 3);
    }
}
