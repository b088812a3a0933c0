//! HTTP surface tests driven through the router with in-process stubs.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use quorate::adapters::NullConnectivityProbe;
use quorate::api::{create_router, AppState};
use quorate::collaborators::{
    CandidateSource, ChainSubmitter, DecisionEngine, PreferenceStore, VoteReceipt,
};
use quorate::config::{
    ActivityConfig, AttestationConfig, HealthConfig, OrchestratorConfig, TrackerConfig,
};
use quorate::domain::{AttestationRecord, Candidate, Preferences, VoteChoice, VoteDecision};
use quorate::error::Result;
use quorate::{
    ActivityLedger, AttestationQueue, CheckpointStore, HealthAggregator, RunOrchestrator,
    RunProjections, StateTransitionTracker,
};

struct StaticPreferences;

#[async_trait]
impl PreferenceStore for StaticPreferences {
    async fn load_preferences(&self) -> Result<Preferences> {
        Ok(Preferences::default())
    }
}

struct StaticCandidates;

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn fetch_candidates(&self, _collection_id: &str) -> Result<Vec<Candidate>> {
        Ok(vec![Candidate {
            id: "p1".to_string(),
            collection_id: "space-1".to_string(),
            title: "Proposal p1".to_string(),
            body: String::new(),
            end_time: Some(Utc::now() + ChronoDuration::hours(2)),
        }])
    }
}

struct ConfidentEngine {
    delay_ms: u64,
}

#[async_trait]
impl DecisionEngine for ConfidentEngine {
    async fn decide(
        &self,
        candidate: &Candidate,
        _preferences: &Preferences,
    ) -> Result<VoteDecision> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        Ok(VoteDecision {
            candidate_id: candidate.id.clone(),
            choice: VoteChoice::For,
            confidence: 0.9,
            rationale: "clear benefit".into(),
        })
    }
}

struct OkSubmitter;

#[async_trait]
impl ChainSubmitter for OkSubmitter {
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
        Ok(format!("0xattest_{}", record.proposal_id))
    }
}

async fn app(decision_delay_ms: u64) -> axum::Router {
    let dir = std::env::temp_dir().join(format!("quorate-api-{}", uuid::Uuid::new_v4()));
    let store = CheckpointStore::new(dir);

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
    let orchestrator_config = OrchestratorConfig {
        agent_address: "0xagent".to_string(),
        ..Default::default()
    };
    let health = Arc::new(HealthAggregator::new(
        &HealthConfig::default(),
        &orchestrator_config,
        Arc::new(NullConnectivityProbe),
        ledger.clone(),
        tracker.clone(),
    ));
    let orchestrator = Arc::new(RunOrchestrator::new(
        orchestrator_config,
        store.clone(),
        tracker.clone(),
        ledger.clone(),
        queue.clone(),
        Arc::new(StaticPreferences),
        Arc::new(StaticCandidates),
        Arc::new(ConfidentEngine {
            delay_ms: decision_delay_ms,
        }),
        Arc::new(OkSubmitter),
    ));
    let projections = Arc::new(RunProjections::new(store));

    create_router(AppState {
        orchestrator,
        tracker,
        ledger,
        queue,
        health,
        projections,
        start_time: Utc::now(),
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthcheck_is_always_200() {
    let app = app(0).await;
    let response = app.oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Unreachable chain is stated in the body, never as an HTTP failure.
    let body = json_body(response).await;
    assert_eq!(body["is_chain_healthy"], false);
    assert_eq!(body["seconds_since_last_transition"], -1.0);
    assert_eq!(body["activity_health"]["has_required_resources"], true);
}

#[tokio::test]
async fn trigger_run_returns_summary() {
    let app = app(0).await;
    let response = app
        .clone()
        .oneshot(post_json(
            "/agent-run",
            json!({"collection_id": "space-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["completed"], true);
    assert_eq!(body["votes_cast"], 1);

    // Decisions and statistics reflect the persisted checkpoint.
    let response = app.clone().oneshot(get("/agent-run/decisions")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["candidate_id"], "p1");

    let response = app.oneshot(get("/agent-run/statistics")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["collections_tracked"], 1);
    assert_eq!(body["votes_submitted"], 1);
}

#[tokio::test]
async fn concurrent_trigger_conflicts_with_409() {
    let app = app(300).await;

    let racing = {
        let app = app.clone();
        tokio::spawn(async move {
            app.oneshot(post_json("/agent-run", json!({"collection_id": "space-1"})))
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = app
        .oneshot(post_json("/agent-run", json!({"collection_id": "space-1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["category"], "concurrency");

    assert_eq!(racing.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_collection_id_is_400() {
    let app = app(0).await;
    let response = app
        .oneshot(post_json("/agent-run", json!({"collection_id": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn activity_endpoints_expose_ledger_state() {
    let app = app(0).await;

    // One completed run: considered, attested, and drained.
    let response = app
        .clone()
        .oneshot(post_json("/agent-run", json!({"collection_id": "space-1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/activity/nonces")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["base"], json!([1, 1, 1, 0]));

    // Unknown chain reads as all zeros.
    let response = app
        .clone()
        .oneshot(get("/activity/nonces?chain=gnosis"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["gnosis"], json!([0, 0, 0, 0]));

    // One action against a one-per-day ratio meets the KPI.
    let response = app
        .clone()
        .oneshot(get("/activity/eligibility/base"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["is_live"], true);

    let response = app.oneshot(get("/attestations/dead-letter")).await.unwrap();
    let body = json_body(response).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn run_status_reports_idle_after_completion() {
    let app = app(0).await;
    app.clone()
        .oneshot(post_json("/agent-run", json!({"collection_id": "space-1"})))
        .await
        .unwrap();

    let response = app.oneshot(get("/agent-run/status")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["current_phase"], "idle");
}
