//! Attestation retry queue with bounded retries and a dead-letter list.
//!
//! Pending records are submitted strictly sequentially in enqueue order,
//! which also preserves per-chain ordering for the chain submitter's
//! sequencing assumptions. A record that exhausts its retry budget is marked
//! FAILED and parked on the persisted dead-letter list, where it stays
//! inspectable but is never processed again.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::ChainSubmitter;
use crate::config::AttestationConfig;
use crate::domain::{AttestationRecord, AttestationStatus};
use crate::error::Result;
use crate::persistence::CheckpointStore;

const STORE_KEY: &str = "attestation_queue";

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    pending: Vec<AttestationRecord>,
    dead_letter: Vec<AttestationRecord>,
}

/// Result of one `process_pending` pass.
#[derive(Debug, Default, Clone)]
pub struct ProcessOutcome {
    pub submitted: Vec<AttestationRecord>,
    pub retried: usize,
    pub dead_lettered: usize,
}

pub struct AttestationQueue {
    max_retries: u32,
    store: CheckpointStore,
    inner: Mutex<QueueFile>,
}

impl AttestationQueue {
    pub async fn load(store: CheckpointStore, config: &AttestationConfig) -> Result<Self> {
        let file = store
            .load::<QueueFile>(STORE_KEY)
            .await?
            .unwrap_or_default();
        Ok(Self {
            max_retries: config.max_retries,
            store,
            inner: Mutex::new(file),
        })
    }

    /// Append a record to the persisted pending list. Re-enqueueing an id
    /// that is already pending is a no-op; returns whether the record was
    /// actually added.
    pub async fn enqueue(&self, record: AttestationRecord) -> Result<bool> {
        let mut file = self.inner.lock().await;
        if file.pending.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        info!(
            id = %record.id,
            proposal = %record.proposal_id,
            chain = %record.chain,
            "attestation enqueued"
        );
        file.pending.push(record);
        self.store.save(STORE_KEY, &*file).await?;
        Ok(true)
    }

    /// Submit every pending record once, in enqueue order.
    ///
    /// Success removes the record from the pending list as SUBMITTED;
    /// failure increments its retry counter, and hitting the configured
    /// maximum demotes it to the dead-letter list. The queue file is
    /// persisted after each record so a crash mid-pass never resurrects an
    /// already-submitted record. Submissions are not cancelled mid-flight.
    pub async fn process_pending(
        &self,
        submitter: &Arc<dyn ChainSubmitter>,
    ) -> Result<ProcessOutcome> {
        let mut outcome = ProcessOutcome::default();
        let mut file = self.inner.lock().await;

        let mut index = 0;
        while index < file.pending.len() {
            if file.pending[index].status != AttestationStatus::Pending {
                // Already submitted records are a no-op; drop them from the
                // pending list without resubmitting.
                file.pending.remove(index);
                continue;
            }

            let record = file.pending[index].clone();
            match submitter.submit_attestation(&record).await {
                Ok(reference) => {
                    info!(
                        id = %record.id,
                        proposal = %record.proposal_id,
                        reference = %reference,
                        "attestation submitted"
                    );
                    let mut submitted = file.pending.remove(index);
                    submitted.status = AttestationStatus::Submitted;
                    outcome.submitted.push(submitted);
                }
                Err(e) => {
                    let record = &mut file.pending[index];
                    record.retry_count += 1;
                    warn!(
                        id = %record.id,
                        proposal = %record.proposal_id,
                        retry_count = record.retry_count,
                        error = %e,
                        "attestation submission failed"
                    );
                    if record.retry_count >= self.max_retries {
                        let mut failed = file.pending.remove(index);
                        failed.status = AttestationStatus::Failed;
                        warn!(id = %failed.id, "attestation moved to dead-letter");
                        file.dead_letter.push(failed);
                        outcome.dead_lettered += 1;
                    } else {
                        outcome.retried += 1;
                        index += 1;
                    }
                }
            }
            self.store.save(STORE_KEY, &*file).await?;
        }

        Ok(outcome)
    }

    pub async fn pending(&self) -> Vec<AttestationRecord> {
        self.inner.lock().await.pending.clone()
    }

    pub async fn pending_ids(&self) -> Vec<Uuid> {
        self.inner.lock().await.pending.iter().map(|r| r.id).collect()
    }

    pub async fn dead_letter(&self) -> Vec<AttestationRecord> {
        self.inner.lock().await.dead_letter.clone()
    }
}
