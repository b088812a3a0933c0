//! Collaborator seams consumed by the orchestrator and health aggregator.
//!
//! These are the external surfaces of the system: candidate fetching,
//! decision making, chain submission, preference storage, and chain
//! connectivity. The core only depends on the traits; concrete adapters live
//! in `crate::adapters` and test doubles are generated with mockall.

use async_trait::async_trait;

use crate::domain::{AttestationRecord, Candidate, Preferences, VoteDecision};
use crate::error::Result;

/// Operator preference storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load_preferences(&self) -> Result<Preferences>;
}

/// Source of governance proposal candidates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch_candidates(&self, collection_id: &str) -> Result<Vec<Candidate>>;
}

/// Decision engine. A failure here means "skip this candidate", never a
/// fatal run error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(&self, candidate: &Candidate, preferences: &Preferences)
        -> Result<VoteDecision>;
}

/// Transaction reference returned by a successful vote submission.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub reference: String,
}

/// On-chain submission surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    async fn submit_vote(
        &self,
        collection_id: &str,
        proposal_id: &str,
        choice: u8,
    ) -> Result<VoteReceipt>;

    async fn submit_attestation(&self, record: &AttestationRecord) -> Result<String>;
}

/// Chain connectivity probe, used only by the health aggregator and bounded
/// by its own timeout there.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> Result<bool>;
}
