//! Run orchestrator: drives the fetch -> filter -> decide -> submit -> attest
//! workflow as a single-writer phase machine.
//!
//! Exactly one run may be active per orchestrator instance; a second trigger
//! is rejected, never queued. Before each stage the run checkpoint is
//! persisted, so a crash between "checkpoint written" and "stage executed"
//! costs nothing but that run: the next run starts fresh while already
//! enqueued attestations survive in the retry queue.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::activity::ActivityLedger;
use crate::attestation::AttestationQueue;
use crate::collaborators::{CandidateSource, ChainSubmitter, DecisionEngine, PreferenceStore};
use crate::config::OrchestratorConfig;
use crate::domain::{
    AttestationRecord, Candidate, DecisionRecord, PhaseCheckpoint, Preferences, RunCheckpoint,
    RunPhase, VoteDecision,
};
use crate::error::{AgentError, Result};
use crate::persistence::CheckpointStore;
use crate::tracker::StateTransitionTracker;

/// Outcome of one run, returned to the trigger caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub collection_id: String,
    pub dry_run: bool,
    pub candidates_considered: usize,
    pub votes_cast: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub completed: bool,
}

pub struct RunOrchestrator {
    config: OrchestratorConfig,
    store: CheckpointStore,
    tracker: Arc<StateTransitionTracker>,
    ledger: Arc<ActivityLedger>,
    queue: Arc<AttestationQueue>,
    preferences: Arc<dyn PreferenceStore>,
    candidates: Arc<dyn CandidateSource>,
    engine: Arc<dyn DecisionEngine>,
    submitter: Arc<dyn ChainSubmitter>,
    active: AtomicBool,
    shutdown: AtomicBool,
}

impl RunOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        store: CheckpointStore,
        tracker: Arc<StateTransitionTracker>,
        ledger: Arc<ActivityLedger>,
        queue: Arc<AttestationQueue>,
        preferences: Arc<dyn PreferenceStore>,
        candidates: Arc<dyn CandidateSource>,
        engine: Arc<dyn DecisionEngine>,
        submitter: Arc<dyn ChainSubmitter>,
    ) -> Self {
        Self {
            config,
            store,
            tracker,
            ledger,
            queue,
            preferences,
            candidates,
            engine,
            submitter,
            active: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Whether a run is currently holding the single-writer slot.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn current_phase(&self) -> RunPhase {
        self.tracker.current_phase().await
    }

    /// Request cooperative shutdown: the current stage finishes, a final
    /// checkpoint is written, and the run stops advancing.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!("orchestrator shutdown requested");
    }

    /// Execute a full run for `collection_id`.
    ///
    /// Allowed only while IDLE; a concurrent trigger is rejected with a
    /// concurrency error and leaves the active run untouched. Stage failures
    /// route through ERROR and immediately back to IDLE, so the orchestrator
    /// is always ready for the next trigger.
    pub async fn trigger_run(&self, collection_id: &str, dry_run: bool) -> Result<RunSummary> {
        if collection_id.trim().is_empty() {
            return Err(AgentError::Validation(
                "collection_id must not be empty".to_string(),
            ));
        }
        // The id becomes part of the checkpoint file name; reject anything
        // that cannot form a single path component.
        if !collection_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AgentError::Validation(format!(
                "collection_id '{collection_id}' may only contain alphanumerics, '-', '_' and '.'"
            )));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AgentError::RunActive(collection_id.to_string()));
        }

        let result = self.execute_run(collection_id, dry_run).await;
        self.active.store(false, Ordering::SeqCst);
        result
    }

    async fn execute_run(&self, collection_id: &str, dry_run: bool) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = format!("run_{}_{}", collection_id, Utc::now().timestamp_millis());
        let mut checkpoint = RunCheckpoint::new(&run_id, collection_id, dry_run);

        info!(run_id, collection_id, dry_run, "run starting");

        // STARTING: persist, announce, then drain attestations left over
        // from previous runs.
        if let Err(e) = self
            .enter_stage(&mut checkpoint, PhaseCheckpoint::Starting, RunPhase::Starting, &run_id)
            .await
        {
            return self.finalize_error(checkpoint, "starting", e, started).await;
        }
        self.drain_attestations(&mut checkpoint, "starting").await;

        if self.should_stop() {
            return self.finalize_stopped(checkpoint, started).await;
        }

        // LOADING_PREFERENCES: a load failure is recorded and falls back to
        // defaults rather than aborting the run.
        if let Err(e) = self
            .enter_stage(
                &mut checkpoint,
                PhaseCheckpoint::LoadingPreferences,
                RunPhase::LoadingPreferences,
                &run_id,
            )
            .await
        {
            return self
                .finalize_error(checkpoint, "loading_preferences", e, started)
                .await;
        }
        let preferences = match self.preferences.load_preferences().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "preference load failed, using defaults");
                checkpoint.record_error("loading_preferences", e.category(), e.to_string());
                Preferences::default()
            }
        };

        if self.should_stop() {
            return self.finalize_stopped(checkpoint, started).await;
        }

        // FETCHING_CANDIDATES
        if let Err(e) = self
            .enter_stage(
                &mut checkpoint,
                PhaseCheckpoint::FetchingCandidates,
                RunPhase::FetchingCandidates,
                &run_id,
            )
            .await
        {
            return self
                .finalize_error(checkpoint, "fetching_candidates", e, started)
                .await;
        }
        let fetched = match self.candidates.fetch_candidates(collection_id).await {
            Ok(c) => c,
            Err(e) => {
                return self
                    .finalize_error(checkpoint, "fetching_candidates", e, started)
                    .await;
            }
        };

        if self.should_stop() {
            return self.finalize_stopped(checkpoint, started).await;
        }

        // FILTERING_CANDIDATES
        if let Err(e) = self
            .enter_stage(
                &mut checkpoint,
                PhaseCheckpoint::FilteringCandidates {
                    total_candidates: fetched.len(),
                },
                RunPhase::FilteringCandidates,
                &run_id,
            )
            .await
        {
            return self
                .finalize_error(checkpoint, "filtering_candidates", e, started)
                .await;
        }
        let filtered = filter_candidates(fetched, &preferences);
        info!(run_id, kept = filtered.len(), "candidates filtered");

        if filtered.is_empty() {
            // Nothing actionable this run; record the no-opportunity counter
            // and complete normally.
            if let Err(e) = self
                .ledger
                .increment_no_voting(&self.config.attestation_chain)
                .await
            {
                warn!(error = %e, "no-voting counter update failed");
                checkpoint.record_error("filtering_candidates", e.category(), e.to_string());
            }
            return self
                .finalize_completed(checkpoint, started, 0, 0)
                .await;
        }

        // ANALYZING / DECIDING per candidate; a decision failure skips that
        // candidate only.
        let mut decisions: Vec<VoteDecision> = Vec::new();
        let total = filtered.len();
        for candidate in &filtered {
            if self.should_stop() {
                return self.finalize_stopped(checkpoint, started).await;
            }
            if let Err(e) = self
                .enter_stage(
                    &mut checkpoint,
                    PhaseCheckpoint::Analyzing {
                        candidate_id: candidate.id.clone(),
                    },
                    RunPhase::Analyzing,
                    &run_id,
                )
                .await
            {
                return self.finalize_error(checkpoint, "analyzing", e, started).await;
            }
            if let Err(e) = self
                .ledger
                .increment_voting_considered(&self.config.attestation_chain)
                .await
            {
                warn!(error = %e, "considered counter update failed");
            }
            if let Err(e) = self
                .enter_stage(
                    &mut checkpoint,
                    PhaseCheckpoint::Deciding {
                        candidate_id: candidate.id.clone(),
                    },
                    RunPhase::Deciding,
                    &run_id,
                )
                .await
            {
                return self.finalize_error(checkpoint, "deciding", e, started).await;
            }
            match self.engine.decide(candidate, &preferences).await {
                Ok(decision) => decisions.push(decision),
                Err(e) => {
                    warn!(candidate = %candidate.id, error = %e, "decision failed, skipping candidate");
                    checkpoint.record_error("deciding", e.category(), e.to_string());
                }
            }
        }

        // SUBMITTING
        if let Err(e) = self
            .enter_stage(
                &mut checkpoint,
                PhaseCheckpoint::Submitting {
                    decisions_to_submit: decisions.len(),
                },
                RunPhase::Submitting,
                &run_id,
            )
            .await
        {
            return self.finalize_error(checkpoint, "submitting", e, started).await;
        }

        let mut votes_cast = 0usize;
        for decision in &decisions {
            if decision.confidence < preferences.confidence_threshold {
                info!(
                    candidate = %decision.candidate_id,
                    confidence = decision.confidence,
                    "decision below confidence threshold, not submitting"
                );
                checkpoint
                    .decisions
                    .push(DecisionRecord::from_decision(decision, false));
                continue;
            }

            if dry_run {
                // All stages execute in dry-run, but submission is skipped
                // and no attestation is produced.
                info!(candidate = %decision.candidate_id, "dry run, vote not submitted");
                checkpoint
                    .decisions
                    .push(DecisionRecord::from_decision(decision, false));
                continue;
            }

            match self
                .submitter
                .submit_vote(
                    collection_id,
                    &decision.candidate_id,
                    decision.choice.as_choice_index(),
                )
                .await
            {
                Ok(receipt) => {
                    votes_cast += 1;
                    checkpoint
                        .decisions
                        .push(DecisionRecord::from_decision(decision, true));
                    self.record_vote(&mut checkpoint, decision, &receipt.reference, &run_id)
                        .await;
                }
                Err(e) => {
                    warn!(candidate = %decision.candidate_id, error = %e, "vote submission failed");
                    checkpoint.record_error("submitting", e.category(), e.to_string());
                    checkpoint
                        .decisions
                        .push(DecisionRecord::from_decision(decision, false));
                }
            }
        }

        // Opportunistic attestation pass right after enqueueing.
        if votes_cast > 0 {
            self.drain_attestations(&mut checkpoint, "submitting").await;
        }

        self.finalize_completed(checkpoint, started, total, votes_cast)
            .await
    }

    /// Persist the checkpoint describing the stage about to run, then report
    /// the phase change to the tracker.
    async fn enter_stage(
        &self,
        checkpoint: &mut RunCheckpoint,
        phase: PhaseCheckpoint,
        run_phase: RunPhase,
        run_id: &str,
    ) -> Result<()> {
        checkpoint.phase = phase;
        self.store
            .save(
                &RunCheckpoint::store_key(&checkpoint.collection_id),
                checkpoint,
            )
            .await?;
        self.tracker
            .transition(run_phase, run_meta(run_id))
            .await?;
        Ok(())
    }

    /// Enqueue an attestation for a successful vote and bump the ledger.
    async fn record_vote(
        &self,
        checkpoint: &mut RunCheckpoint,
        decision: &VoteDecision,
        vote_reference: &str,
        run_id: &str,
    ) {
        let record = AttestationRecord::new(
            &decision.candidate_id,
            &checkpoint.collection_id,
            &self.config.attestation_chain,
            &self.config.agent_address,
            decision.choice,
            vote_reference,
            run_id,
            decision.confidence,
        );
        let id = record.id;
        match self.queue.enqueue(record).await {
            Ok(_) => checkpoint.pending_attestation_ids.push(id),
            Err(e) => {
                // Attestation bookkeeping never blocks voting.
                error!(error = %e, "failed to enqueue attestation");
                checkpoint.record_error("submitting", e.category(), e.to_string());
            }
        }
        if let Err(e) = self
            .ledger
            .increment_vote_attestation(&self.config.attestation_chain)
            .await
        {
            warn!(error = %e, "vote attestation counter update failed");
        }
    }

    /// One submission pass over the pending attestation list; submitted
    /// records count as multisig activity on their chain. Processing
    /// failures are charged to the stage that requested the drain.
    async fn drain_attestations(&self, checkpoint: &mut RunCheckpoint, stage: &str) {
        match self.queue.process_pending(&self.submitter).await {
            Ok(outcome) => {
                for record in &outcome.submitted {
                    if let Err(e) = self.ledger.increment_multisig_activity(&record.chain).await {
                        warn!(chain = %record.chain, error = %e, "multisig counter update failed");
                    }
                }
                if outcome.dead_lettered > 0 {
                    warn!(count = outcome.dead_lettered, "attestations dead-lettered");
                }
            }
            Err(e) => {
                warn!(stage, error = %e, "attestation processing failed");
                checkpoint.record_error(stage, e.category(), e.to_string());
            }
        }
        checkpoint.pending_attestation_ids = self.queue.pending_ids().await;
    }

    fn should_stop(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn finalize_completed(
        &self,
        mut checkpoint: RunCheckpoint,
        started: Instant,
        candidates_considered: usize,
        votes_cast: usize,
    ) -> Result<RunSummary> {
        let duration_ms = started.elapsed().as_millis() as u64;
        checkpoint.phase = PhaseCheckpoint::Completed {
            votes_cast,
            duration_ms,
        };
        let key = RunCheckpoint::store_key(&checkpoint.collection_id);
        self.store.save(&key, &checkpoint).await?;
        self.tracker
            .transition(RunPhase::Completed, run_meta(&checkpoint.run_id))
            .await?;
        self.tracker
            .transition(RunPhase::Idle, run_meta(&checkpoint.run_id))
            .await?;

        info!(
            run_id = %checkpoint.run_id,
            votes_cast,
            duration_ms,
            "run completed"
        );
        Ok(summary_of(&checkpoint, candidates_considered, votes_cast, duration_ms, true))
    }

    /// Route a fatal stage failure through ERROR and immediately back to
    /// IDLE; the orchestrator is never left in ERROR.
    async fn finalize_error(
        &self,
        mut checkpoint: RunCheckpoint,
        stage: &str,
        err: AgentError,
        started: Instant,
    ) -> Result<RunSummary> {
        error!(run_id = %checkpoint.run_id, stage, error = %err, "stage failed");
        let category = err.category();
        checkpoint.record_error(stage, category, err.to_string());
        checkpoint.phase = PhaseCheckpoint::Error {
            stage: stage.to_string(),
            category: category.to_string(),
        };
        let key = RunCheckpoint::store_key(&checkpoint.collection_id);
        if let Err(e) = self.store.save(&key, &checkpoint).await {
            error!(error = %e, "failed to persist error checkpoint");
        }
        let meta = run_meta(&checkpoint.run_id);
        if let Err(e) = self.tracker.transition(RunPhase::Error, meta.clone()).await {
            error!(error = %e, "failed to record error transition");
        }
        if let Err(e) = self.tracker.transition(RunPhase::Idle, meta).await {
            error!(error = %e, "failed to return to idle");
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary_of(&checkpoint, 0, 0, duration_ms, false))
    }

    /// Cooperative stop between stages: final checkpoint, back to IDLE.
    async fn finalize_stopped(
        &self,
        checkpoint: RunCheckpoint,
        started: Instant,
    ) -> Result<RunSummary> {
        info!(run_id = %checkpoint.run_id, "run stopped by shutdown request");
        let key = RunCheckpoint::store_key(&checkpoint.collection_id);
        if let Err(e) = self.store.save(&key, &checkpoint).await {
            error!(error = %e, "failed to persist shutdown checkpoint");
        }
        if let Err(e) = self
            .tracker
            .transition(RunPhase::Idle, run_meta(&checkpoint.run_id))
            .await
        {
            error!(error = %e, "failed to return to idle on shutdown");
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary_of(&checkpoint, 0, 0, duration_ms, false))
    }
}

fn run_meta(run_id: &str) -> HashMap<String, String> {
    HashMap::from([("run_id".to_string(), run_id.to_string())])
}

fn summary_of(
    checkpoint: &RunCheckpoint,
    candidates_considered: usize,
    votes_cast: usize,
    duration_ms: u64,
    completed: bool,
) -> RunSummary {
    RunSummary {
        run_id: checkpoint.run_id.clone(),
        collection_id: checkpoint.collection_id.clone(),
        dry_run: checkpoint.dry_run,
        candidates_considered,
        votes_cast,
        errors: checkpoint
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.stage, e.message))
            .collect(),
        duration_ms,
        completed,
    }
}

/// Apply preference filtering: denylist, optional allowlist, voting-window
/// expiry, then the per-run cap.
fn filter_candidates(candidates: Vec<Candidate>, preferences: &Preferences) -> Vec<Candidate> {
    let now = Utc::now();
    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| !preferences.denylist.contains(&c.id))
        .filter(|c| preferences.allowlist.is_empty() || preferences.allowlist.contains(&c.id))
        .filter(|c| c.end_time.map_or(true, |end| end > now))
        .collect();
    kept.truncate(preferences.max_items_per_run);
    kept
}
