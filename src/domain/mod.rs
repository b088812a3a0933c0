//! Domain model: run phases, candidates, decisions, attestations, checkpoints.

pub mod checkpoint;
pub mod phase;
pub mod types;

pub use checkpoint::{
    DecisionRecord, PhaseCheckpoint, RunCheckpoint, RunError, CHECKPOINT_SCHEMA_VERSION,
};
pub use phase::RunPhase;
pub use types::{
    AttestationRecord, AttestationStatus, Candidate, Preferences, VoteChoice, VoteDecision,
    VotingStrategy,
};
