//! Attestation retry and dead-letter behavior, both standalone and through a
//! full orchestrated run.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quorate::collaborators::{
    CandidateSource, ChainSubmitter, DecisionEngine, PreferenceStore, VoteReceipt,
};
use quorate::config::{
    ActivityConfig, AttestationConfig, OrchestratorConfig, TrackerConfig,
};
use quorate::domain::{
    AttestationRecord, AttestationStatus, Candidate, Preferences, RunCheckpoint, VoteChoice,
    VoteDecision,
};
use quorate::error::{AgentError, Result};
use quorate::{ActivityLedger, AttestationQueue, CheckpointStore, RunOrchestrator,
    StateTransitionTracker};

/// Votes always succeed; attestations fail for the first `fail_first`
/// submission attempts, then succeed.
struct FlakySubmitter {
    fail_first: usize,
    attestation_attempts: AtomicUsize,
}

impl FlakySubmitter {
    fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            attestation_attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChainSubmitter for FlakySubmitter {
    async fn submit_vote(
        &self,
        _collection_id: &str,
        proposal_id: &str,
        _choice: u8,
    ) -> Result<VoteReceipt> {
        Ok(VoteReceipt {
            reference: format!("0xvote_{proposal_id}"),
        })
    }

    async fn submit_attestation(&self, record: &AttestationRecord) -> Result<String> {
        let attempt = self.attestation_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(AgentError::Transient("rpc unavailable".into()));
        }
        Ok(format!("0xattest_{}", record.proposal_id))
    }
}

fn temp_store() -> CheckpointStore {
    let dir = std::env::temp_dir().join(format!("quorate-attest-{}", uuid::Uuid::new_v4()));
    CheckpointStore::new(dir)
}

fn record(proposal: &str) -> AttestationRecord {
    AttestationRecord::new(
        proposal,
        "space-1",
        "base",
        "0xagent",
        VoteChoice::For,
        "0xvote",
        "run-1",
        0.9,
    )
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let store = temp_store();
    let queue = AttestationQueue::load(store.clone(), &AttestationConfig::default())
        .await
        .unwrap();
    let submitter: Arc<dyn ChainSubmitter> = Arc::new(FlakySubmitter::failing_first(2));

    assert!(queue.enqueue(record("p1")).await.unwrap());

    // Two failing passes bump the retry count but keep the record pending.
    for expected_retries in 1..=2u32 {
        let outcome = queue.process_pending(&submitter).await.unwrap();
        assert!(outcome.submitted.is_empty());
        assert_eq!(outcome.retried, 1);
        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, expected_retries);
        assert_eq!(pending[0].status, AttestationStatus::Pending);
    }

    // Third pass succeeds before the retry cap is hit.
    let outcome = queue.process_pending(&submitter).await.unwrap();
    assert_eq!(outcome.submitted.len(), 1);
    assert!(queue.pending().await.is_empty());
    assert!(queue.dead_letter().await.is_empty());
}

#[tokio::test]
async fn exhausted_retries_move_record_to_dead_letter() {
    let store = temp_store();
    let queue = AttestationQueue::load(store.clone(), &AttestationConfig { max_retries: 3 })
        .await
        .unwrap();
    let submitter: Arc<dyn ChainSubmitter> = Arc::new(FlakySubmitter::failing_first(usize::MAX));

    queue.enqueue(record("p1")).await.unwrap();
    for _ in 0..3 {
        queue.process_pending(&submitter).await.unwrap();
    }

    assert!(queue.pending().await.is_empty());
    let dead = queue.dead_letter().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].status, AttestationStatus::Failed);
    assert_eq!(dead[0].retry_count, 3);

    // Further passes are no-ops; dead-lettered records are never retried.
    let outcome = queue.process_pending(&submitter).await.unwrap();
    assert!(outcome.submitted.is_empty());
    assert_eq!(outcome.retried, 0);
    assert_eq!(queue.dead_letter().await.len(), 1);
}

#[tokio::test]
async fn queue_survives_restart_with_retry_counts() {
    let store = temp_store();
    let submitter: Arc<dyn ChainSubmitter> = Arc::new(FlakySubmitter::failing_first(usize::MAX));

    {
        let queue = AttestationQueue::load(store.clone(), &AttestationConfig::default())
            .await
            .unwrap();
        queue.enqueue(record("p1")).await.unwrap();
        queue.process_pending(&submitter).await.unwrap();
    }

    let queue = AttestationQueue::load(store, &AttestationConfig::default())
        .await
        .unwrap();
    let pending = queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);
}

struct StaticPreferences;

#[async_trait]
impl PreferenceStore for StaticPreferences {
    async fn load_preferences(&self) -> Result<Preferences> {
        Ok(Preferences::default())
    }
}

struct OneCandidate;

#[async_trait]
impl CandidateSource for OneCandidate {
    async fn fetch_candidates(&self, _collection_id: &str) -> Result<Vec<Candidate>> {
        Ok(vec![Candidate {
            id: "p1".to_string(),
            collection_id: "space-1".to_string(),
            title: "Proposal p1".to_string(),
            body: String::new(),
            end_time: Some(Utc::now() + ChronoDuration::hours(1)),
        }])
    }
}

struct ConfidentEngine;

#[async_trait]
impl DecisionEngine for ConfidentEngine {
    async fn decide(
        &self,
        candidate: &Candidate,
        _preferences: &Preferences,
    ) -> Result<VoteDecision> {
        Ok(VoteDecision {
            candidate_id: candidate.id.clone(),
            choice: VoteChoice::For,
            confidence: 0.95,
            rationale: "clear benefit".into(),
        })
    }
}

/// A failed attestation survives the run that created it and is retried by
/// the next run's startup pass.
#[tokio::test]
async fn next_run_retries_attestations_left_by_previous_run() {
    let store = temp_store();
    let tracker = Arc::new(
        StateTransitionTracker::load(store.clone(), &TrackerConfig::default())
            .await
            .unwrap(),
    );
    let ledger = Arc::new(
        ActivityLedger::load(store.clone(), &ActivityConfig::default())
            .await
            .unwrap(),
    );
    let queue = Arc::new(
        AttestationQueue::load(store.clone(), &AttestationConfig::default())
            .await
            .unwrap(),
    );
    // First attestation attempt fails, every later one succeeds.
    let submitter = Arc::new(FlakySubmitter::failing_first(1));

    let orchestrator = RunOrchestrator::new(
        OrchestratorConfig {
            agent_address: "0xagent".to_string(),
            ..Default::default()
        },
        store.clone(),
        tracker,
        ledger.clone(),
        queue.clone(),
        Arc::new(StaticPreferences),
        Arc::new(OneCandidate),
        Arc::new(ConfidentEngine),
        submitter.clone() as Arc<dyn ChainSubmitter>,
    );

    // Run 1: vote lands, attestation fails once and stays pending.
    let summary = orchestrator.trigger_run("space-1", false).await.unwrap();
    assert!(summary.completed);
    assert_eq!(summary.votes_cast, 1);
    let pending = queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(ledger.nonce_vector("base").await[0], 0);

    // Run 2: the startup pass drains the leftover attestation.
    orchestrator.trigger_run("space-1", false).await.unwrap();
    assert!(queue.dead_letter().await.is_empty());
    // Both runs' attestations submitted by now; each counts as multisig
    // activity.
    assert_eq!(ledger.nonce_vector("base").await[0], 2);
    assert_eq!(ledger.nonce_vector("base").await[1], 2);
}

/// Queue trouble during the post-vote drain is charged to the SUBMITTING
/// stage, not to the startup pass.
#[tokio::test]
async fn queue_failure_during_post_vote_drain_is_charged_to_submitting() {
    let store = temp_store();
    let tracker = Arc::new(
        StateTransitionTracker::load(store.clone(), &TrackerConfig::default())
            .await
            .unwrap(),
    );
    let ledger = Arc::new(
        ActivityLedger::load(store.clone(), &ActivityConfig::default())
            .await
            .unwrap(),
    );

    // The queue persists to its own directory, which we occupy with a plain
    // file after loading: every later queue save fails with an I/O error
    // while the run's own store stays healthy.
    let queue_dir =
        std::env::temp_dir().join(format!("quorate-attest-blocked-{}", uuid::Uuid::new_v4()));
    let queue = Arc::new(
        AttestationQueue::load(CheckpointStore::new(&queue_dir), &AttestationConfig::default())
            .await
            .unwrap(),
    );
    tokio::fs::write(&queue_dir, b"").await.unwrap();

    let orchestrator = RunOrchestrator::new(
        OrchestratorConfig {
            agent_address: "0xagent".to_string(),
            ..Default::default()
        },
        store.clone(),
        tracker,
        ledger,
        queue,
        Arc::new(StaticPreferences),
        Arc::new(OneCandidate),
        Arc::new(ConfidentEngine),
        Arc::new(FlakySubmitter::failing_first(0)) as Arc<dyn ChainSubmitter>,
    );

    let summary = orchestrator.trigger_run("space-1", false).await.unwrap();
    assert!(summary.completed);
    assert_eq!(summary.votes_cast, 1);

    // The startup drain had nothing to persist; every recorded error comes
    // from the vote/attestation path.
    assert!(!summary.errors.is_empty());
    assert!(summary.errors.iter().all(|e| e.starts_with("submitting:")));

    let cp: RunCheckpoint = store
        .load(&RunCheckpoint::store_key("space-1"))
        .await
        .unwrap()
        .unwrap();
    assert!(!cp.errors.is_empty());
    assert!(cp.errors.iter().all(|e| e.stage == "submitting"));

    let _ = tokio::fs::remove_file(&queue_dir).await;
    let _ = tokio::fs::remove_dir_all(store.dir()).await;
}
