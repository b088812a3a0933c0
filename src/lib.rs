pub mod activity;
pub mod adapters;
pub mod api;
pub mod attestation;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod persistence;
pub mod projections;
pub mod tracker;

pub use activity::{ActivityLedger, ActivityStatus, NonceVector, LIVENESS_SCALE};
pub use attestation::{AttestationQueue, ProcessOutcome};
pub use config::AppConfig;
pub use error::{AgentError, Result};
pub use health::{HealthAggregator, HealthSnapshot};
pub use orchestrator::{RunOrchestrator, RunSummary};
pub use persistence::CheckpointStore;
pub use projections::RunProjections;
pub use tracker::{StateTransitionTracker, TransitionRecord, TransitionSummary};
