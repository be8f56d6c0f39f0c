use super::common::*;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::screening::dedup::InMemoryDeduplicationIndex;
use crate::workflows::screening::domain::{
    AiStatus, ApplicationId, ExecutionStage, JobId, WorkerId,
};
use crate::workflows::screening::evaluation::{EvaluationEngine, ScoringConfig};
use crate::workflows::screening::jobs::InMemoryJobCatalog;
use crate::workflows::screening::pipeline::{AnalysisPipeline, PipelineCollaborators};
use crate::workflows::screening::repository::{
    ApplicationRecord, ApplicationRepository, PendingFilter, RepositoryError, WriteGuard,
};
use crate::workflows::screening::router::application_router;

struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn write(
        &self,
        _record: ApplicationRecord,
        _guard: &WriteGuard,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn claim(
        &self,
        _id: &ApplicationId,
        _worker: &WorkerId,
        _now: DateTime<Utc>,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn touch(
        &self,
        _id: &ApplicationId,
        _worker: &WorkerId,
        _stage: Option<ExecutionStage>,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn pending(
        &self,
        _filter: &PendingFilter,
        _limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn with_status(
        &self,
        _status: AiStatus,
        _job_id: Option<&JobId>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(&body).expect("serialize body"),
        ))
        .expect("valid request")
}

fn empty_request(method: &str, uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .expect("valid request")
}

#[tokio::test]
async fn submit_route_accepts_payloads() {
    let h = default_harness(qualified_payload());
    let router = application_router(h.pipeline.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/applications",
            json!({
                "candidate_email": "maria.souza@example.com",
                "job_id": ANALYST_JOB,
                "document": "resumes/maria.txt"
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let payload = read_json_body(response).await;
    assert!(payload.get("application_id").is_some());
    assert_eq!(payload.get("ai_status"), Some(&json!("NEW")));
    assert_eq!(payload.get("weighted_score"), Some(&json!(0)));
}

#[tokio::test]
async fn submit_route_rejects_invalid_email() {
    let h = default_harness(qualified_payload());
    let router = application_router(h.pipeline.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/applications",
            json!({"candidate_email": "not-an-email", "document": "resumes/maria.txt"}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn submit_handler_returns_internal_error_on_repository_failure() {
    let collaborators = PipelineCollaborators {
        extractor: Arc::new(StaticExtractor::default()),
        analyst: Arc::new(ScriptedAnalyst::replying(qualified_payload())),
        dedup: Arc::new(InMemoryDeduplicationIndex::default()),
        jobs: Arc::new(InMemoryJobCatalog::default()),
    };
    let pipeline = Arc::new(AnalysisPipeline::new(
        Arc::new(UnavailableRepository),
        Arc::new(MemoryNotifier::default()),
        collaborators,
        EvaluationEngine::new(ScoringConfig::default()),
        pipeline_config(),
    ));

    let response = crate::workflows::screening::router::submit_handler::<
        UnavailableRepository,
        MemoryNotifier,
    >(
        State(pipeline),
        axum::Json(submission("resumes/maria.txt", None)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert!(payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .contains("database offline"));
}

#[tokio::test]
async fn status_handler_reports_scored_records() {
    let h = default_harness(qualified_payload());
    let record = h
        .pipeline
        .submit(submission("resumes/maria.txt", Some(ANALYST_JOB)))
        .expect("submission accepted");
    h.pipeline.admit(5).expect("admit succeeds");
    let lease = h
        .pipeline
        .claim(&record.id)
        .expect("claim call succeeds")
        .expect("claim wins");
    h.pipeline.process(lease).await;

    let response = crate::workflows::screening::router::status_handler::<
        crate::workflows::screening::repository::InMemoryApplicationRepository,
        MemoryNotifier,
    >(State(h.pipeline.clone()), Path(record.id.0.clone()))
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("application_id").and_then(Value::as_str),
        Some(record.id.0.as_str())
    );
    assert_eq!(payload.get("ai_status"), Some(&json!("DONE")));
    assert_eq!(payload.get("execution_stage"), Some(&json!("DONE")));
    assert_eq!(payload.get("score"), Some(&json!(100)));
    // 80 * 0.7 + 60 * 0.3 + 50 * 0.1
    assert_eq!(payload.get("weighted_score"), Some(&json!(79)));
    assert_eq!(
        payload.pointer("/usage/input_tokens"),
        Some(&json!(1200))
    );
}

#[tokio::test]
async fn status_route_returns_not_found_for_unknown_ids() {
    let h = default_harness(qualified_payload());
    let router = application_router(h.pipeline.clone());

    let response = router
        .oneshot(empty_request("GET", "/api/v1/applications/missing-id"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reject_route_conflicts_on_queued_records() {
    let h = default_harness(qualified_payload());
    let record = h
        .pipeline
        .submit(submission("resumes/maria.txt", None))
        .expect("submission accepted");
    h.pipeline.admit(5).expect("admit succeeds");
    let router = application_router(h.pipeline.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/applications/{}/reject", record.id),
            json!({"feedback": "Position filled."}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn clone_route_creates_a_job_copy() {
    let h = default_harness(qualified_payload());
    let mut source = ApplicationRecord::from_submission(
        submission("resumes/maria.txt", None),
        instant(0),
    );
    source.ai_status = AiStatus::Done;
    source.score = Some(70);
    let source = h.repository.insert(source).expect("insert succeeds");
    let router = application_router(h.pipeline.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/applications/{}/clone", source.id),
            json!({"job_id": ANALYST_JOB}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("ai_status"), Some(&json!("PENDING")));
    assert_eq!(
        payload.get("execution_stage"),
        Some(&json!("STARTING_JOB_ANALYSIS"))
    );
    assert_eq!(payload.get("job_id"), Some(&json!(ANALYST_JOB)));
}

#[tokio::test]
async fn job_routes_register_requeue_and_rank() {
    let h = default_harness(qualified_payload());

    let response = application_router(h.pipeline.clone())
        .oneshot(json_request(
            "PUT",
            "/api/v1/jobs/job-bi",
            json!({
                "title": "BI Developer",
                "criteria": [{"label": "Power BI", "eliminatory": true}, {"label": "SQL"}]
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let mut scored = ApplicationRecord::from_submission(
        submission("resumes/maria.txt", Some("job-bi")),
        instant(0),
    );
    scored.ai_status = AiStatus::Done;
    scored.score = Some(80);
    let scored = h.repository.insert(scored).expect("insert succeeds");

    let response = application_router(h.pipeline.clone())
        .oneshot(empty_request("GET", "/api/v1/jobs/job-bi/ranking"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.pointer("/candidates/0/application_id"),
        Some(&json!(scored.id.0))
    );
    assert_eq!(
        payload.pointer("/candidates/0/weighted_score"),
        Some(&json!(56))
    );

    let response = application_router(h.pipeline.clone())
        .oneshot(empty_request("POST", "/api/v1/jobs/job-bi/requeue"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("requeued"), Some(&json!(1)));

    let stored = h.pipeline.get(&scored.id).expect("record stored");
    assert_eq!(stored.ai_status, AiStatus::Pending);
    assert_eq!(stored.execution_stage, ExecutionStage::QueuedReanalysis);
}

#[tokio::test]
async fn requeue_route_returns_not_found_for_unknown_jobs() {
    let h = default_harness(qualified_payload());

    let response = application_router(h.pipeline.clone())
        .oneshot(empty_request("POST", "/api/v1/jobs/job-missing/requeue"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
