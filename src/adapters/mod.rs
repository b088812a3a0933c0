//! Concrete collaborator implementations.
//!
//! Preferences come from a JSON file next to the rest of the persisted
//! state; candidates, decisions, and chain submissions go over HTTP to
//! sidecar services; chain connectivity is probed with a JSON-RPC
//! `eth_blockNumber` call.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::collaborators::{
    CandidateSource, ChainSubmitter, ConnectivityProbe, DecisionEngine, PreferenceStore,
    VoteReceipt,
};
use crate::domain::{AttestationRecord, Candidate, Preferences, VoteDecision};
use crate::error::{AgentError, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> Client {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Preferences stored as a JSON file managed by the operator.
///
/// A missing file means "no preferences configured yet" and yields the
/// defaults; a malformed file is an error so a typo never silently widens
/// the voting surface.
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn load_preferences(&self) -> Result<Preferences> {
        let body = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no preference file, using defaults");
                return Ok(Preferences::default());
            }
            Err(e) => return Err(AgentError::Io(e)),
        };
        let prefs: Preferences = serde_json::from_str(&body)
            .map_err(|e| AgentError::Validation(format!("malformed preference file: {e}")))?;
        if !(0.0..=1.0).contains(&prefs.confidence_threshold) {
            return Err(AgentError::Validation(
                "confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        Ok(prefs)
    }
}

/// Candidate source backed by an HTTP proposal index.
pub struct HttpCandidateSource {
    client: Client,
    base_url: String,
}

impl HttpCandidateSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn fetch_candidates(&self, collection_id: &str) -> Result<Vec<Candidate>> {
        let url = format!("{}/proposals", self.base_url.trim_end_matches('/'));
        let candidates: Vec<Candidate> = self
            .client
            .get(&url)
            .query(&[("collection_id", collection_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(collection_id, count = candidates.len(), "candidates fetched");
        Ok(candidates)
    }
}

/// Decision engine reached over HTTP.
pub struct HttpDecisionEngine {
    client: Client,
    base_url: String,
}

impl HttpDecisionEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DecisionEngine for HttpDecisionEngine {
    async fn decide(
        &self,
        candidate: &Candidate,
        preferences: &Preferences,
    ) -> Result<VoteDecision> {
        let url = format!("{}/decide", self.base_url.trim_end_matches('/'));
        let decision: VoteDecision = self
            .client
            .post(&url)
            .json(&json!({
                "candidate": candidate,
                "strategy": preferences.strategy,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if decision.candidate_id != candidate.id {
            return Err(AgentError::Validation(format!(
                "decision references candidate {} instead of {}",
                decision.candidate_id, candidate.id
            )));
        }
        Ok(decision)
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    reference: String,
}

/// Vote and attestation submission via an HTTP transaction relay.
pub struct HttpChainSubmitter {
    client: Client,
    base_url: String,
}

impl HttpChainSubmitter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChainSubmitter for HttpChainSubmitter {
    async fn submit_vote(
        &self,
        collection_id: &str,
        proposal_id: &str,
        choice: u8,
    ) -> Result<VoteReceipt> {
        let url = format!("{}/vote", self.base_url.trim_end_matches('/'));
        let resp: SubmitResponse = self
            .client
            .post(&url)
            .json(&json!({
                "collection_id": collection_id,
                "proposal_id": proposal_id,
                "choice": choice,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(proposal_id, reference = %resp.reference, "vote submitted");
        Ok(VoteReceipt {
            reference: resp.reference,
        })
    }

    async fn submit_attestation(&self, record: &AttestationRecord) -> Result<String> {
        let url = format!("{}/attestation", self.base_url.trim_end_matches('/'));
        let resp: SubmitResponse = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(id = %record.id, reference = %resp.reference, "attestation submitted");
        Ok(resp.reference)
    }
}

/// Chain connectivity probe: one `eth_blockNumber` call against the
/// configured RPC endpoint.
pub struct JsonRpcConnectivityProbe {
    client: Client,
    rpc_url: String,
}

impl JsonRpcConnectivityProbe {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            rpc_url: rpc_url.into(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for JsonRpcConnectivityProbe {
    async fn check(&self) -> Result<bool> {
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "eth_blockNumber",
                "params": [],
                "id": 1,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "rpc endpoint unhealthy");
            return Ok(false);
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body.get("result").is_some())
    }
}

/// Probe used when no RPC endpoint is configured; reports the chain as
/// unreachable so liveness checks stay honest.
pub struct NullConnectivityProbe;

#[async_trait]
impl ConnectivityProbe for NullConnectivityProbe {
    async fn check(&self) -> Result<bool> {
        Ok(false)
    }
}
