//! End-to-end scenarios for résumé screening driven through the public pipeline facade, the
//! dispatcher and the HTTP router, reading résumés from a real directory.

mod common {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use hireflow::workflows::screening::{
        AnalysisPipeline, AnalysisRequest, AnalystError, AnalystResponse, CandidateAnalyst,
        Criterion, FilesystemExtractor, InMemoryApplicationRepository,
        InMemoryDeduplicationIndex, InMemoryJobCatalog, JobContext, JobId, Notification,
        NotificationError, Notifier, PipelineCollaborators, PipelineConfig, TokenUsage,
    };
    use hireflow::workflows::screening::{EvaluationEngine, ScoringConfig};

    pub(super) const JOB: &str = "job-controller";

    /// Scratch directory removed on drop.
    pub(super) struct ResumeDir {
        pub(super) path: PathBuf,
    }

    impl ResumeDir {
        pub(super) fn new() -> Self {
            let path = std::env::temp_dir().join(format!("hireflow-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).expect("create scratch dir");
            Self { path }
        }

        pub(super) fn write(&self, name: &str, contents: &str) {
            std::fs::write(self.path.join(name), contents).expect("write résumé");
        }
    }

    impl Drop for ResumeDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    /// Marks a criterion as met when its lowercase label appears in the résumé text.
    pub(super) struct KeywordAnalyst;

    #[async_trait]
    impl CandidateAnalyst for KeywordAnalyst {
        async fn analyze(
            &self,
            request: &AnalysisRequest,
        ) -> Result<AnalystResponse, AnalystError> {
            let text = request.text.to_lowercase();
            let verdicts: serde_json::Map<String, serde_json::Value> = request
                .job
                .as_ref()
                .map(|job| {
                    job.criteria
                        .iter()
                        .map(|criterion| {
                            let keyword = criterion
                                .label
                                .split_whitespace()
                                .next()
                                .unwrap_or_default()
                                .to_lowercase();
                            (criterion.label.clone(), json!(text.contains(&keyword)))
                        })
                        .collect()
                })
                .unwrap_or_default();

            let raw = json!({
                "schema_version": "1.2",
                "is_resume": !request.degraded,
                "base_scores": {"tecnica": 70, "cultura": 50, "performance": 60},
                "criteria_evaluation": verdicts,
            })
            .to_string();
            Ok(AnalystResponse {
                raw,
                usage: TokenUsage {
                    input_tokens: 900,
                    output_tokens: 100,
                },
            })
        }
    }

    #[derive(Default)]
    pub(super) struct RecordingNotifier {
        pub(super) sent: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
            self.sent
                .lock()
                .expect("notifier mutex poisoned")
                .push(notification);
            Ok(())
        }
    }

    pub(super) type Pipeline = AnalysisPipeline<InMemoryApplicationRepository, RecordingNotifier>;

    pub(super) fn controller_job() -> JobContext {
        JobContext {
            job_id: JobId(JOB.to_string()),
            title: "Financial Controller".to_string(),
            description: "Month-end close and reporting".to_string(),
            criteria: vec![
                Criterion::new("SAP (obrigatório)"),
                Criterion::new("IFRS reporting"),
            ],
        }
    }

    pub(super) fn pipeline(
        dir: &ResumeDir,
    ) -> (
        Arc<Pipeline>,
        Arc<InMemoryApplicationRepository>,
        Arc<RecordingNotifier>,
    ) {
        let repository = Arc::new(InMemoryApplicationRepository::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let collaborators = PipelineCollaborators {
            extractor: Arc::new(FilesystemExtractor::new(dir.path.clone())),
            analyst: Arc::new(KeywordAnalyst),
            dedup: Arc::new(InMemoryDeduplicationIndex::default()),
            jobs: Arc::new(InMemoryJobCatalog::with_jobs([controller_job()])),
        };
        let config = PipelineConfig {
            worker_id: "it-worker".to_string(),
            poll_interval: Duration::from_millis(10),
            ..PipelineConfig::default()
        };
        let pipeline = Arc::new(AnalysisPipeline::new(
            repository.clone(),
            notifier.clone(),
            collaborators,
            EvaluationEngine::new(ScoringConfig::default()),
            config,
        ));
        (pipeline, repository, notifier)
    }
}

use std::sync::Arc;

use axum::http::StatusCode;
use common::*;
use hireflow::workflows::screening::{
    application_router, AiStatus, ApplicationSubmission, BatchDispatcher, DocumentRef,
    ExecutionStage, JobId,
};
use tower::ServiceExt;

fn submission(document: &str) -> ApplicationSubmission {
    ApplicationSubmission {
        candidate_name: None,
        candidate_email: None,
        job_id: Some(JobId(JOB.to_string())),
        document: DocumentRef(document.to_string()),
    }
}

#[tokio::test]
async fn batch_scores_rejects_and_degrades_from_disk() {
    let dir = ResumeDir::new();
    dir.write(
        "carla.txt",
        "Carla Mendes Prado\ncarla.prado@example.com\nController with eight years of SAP and IFRS reporting.",
    );
    dir.write(
        "bruno.txt",
        "Bruno Alves Costa\nbruno.costa@example.com\nAccountant focused on IFRS reporting for retail groups.",
    );
    let (pipeline, _, notifier) = pipeline(&dir);

    let carla = pipeline.submit(submission("carla.txt")).expect("accepted");
    let bruno = pipeline.submit(submission("bruno.txt")).expect("accepted");
    let scanned = pipeline.submit(submission("scan.pdf")).expect("accepted");

    let dispatcher = BatchDispatcher::new(Arc::clone(&pipeline));
    let report = dispatcher.tick().await.expect("tick succeeds");
    assert_eq!(report.claimed, 3);

    let carla = pipeline.get(&carla.id).expect("stored");
    assert_eq!(carla.ai_status, AiStatus::Done);
    assert_eq!(carla.score, Some(100));
    assert_eq!(carla.candidate_name.as_deref(), Some("Carla Mendes Prado"));
    assert_eq!(
        carla.candidate_email.as_deref(),
        Some("carla.prado@example.com")
    );

    let bruno = pipeline.get(&bruno.id).expect("stored");
    assert_eq!(bruno.ai_status, AiStatus::Rejected);
    assert_eq!(bruno.score, Some(0));

    // Unreadable PDFs are flagged as non-résumés by this analyst.
    let scanned = pipeline.get(&scanned.id).expect("stored");
    assert_eq!(scanned.ai_status, AiStatus::Error);
    assert_eq!(scanned.execution_stage, ExecutionStage::Error);

    let sent = notifier.sent.lock().expect("notifier mutex poisoned");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].application_id, bruno.id);
}

#[tokio::test]
async fn duplicate_resume_reuses_the_first_evaluation() {
    let dir = ResumeDir::new();
    let text = "Carla Mendes Prado\ncarla.prado@example.com\nController with eight years of SAP and IFRS reporting.";
    dir.write("carla.txt", text);
    dir.write("carla-copy.txt", &format!("\n\n{text}\n"));
    let (pipeline, _, _) = pipeline(&dir);
    let dispatcher = BatchDispatcher::new(Arc::clone(&pipeline));

    let first = pipeline.submit(submission("carla.txt")).expect("accepted");
    dispatcher.tick().await.expect("tick succeeds");
    let second = pipeline
        .submit(submission("carla-copy.txt"))
        .expect("accepted");
    let report = dispatcher.tick().await.expect("tick succeeds");

    assert_eq!(report.cached, 1);
    let first = pipeline.get(&first.id).expect("stored");
    let second = pipeline.get(&second.id).expect("stored");
    assert_eq!(second.execution_stage, ExecutionStage::DoneCached);
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(second.score, first.score);
}

#[tokio::test]
async fn paths_outside_the_resume_root_are_never_read() {
    let dir = ResumeDir::new();
    let (pipeline, _, _) = pipeline(&dir);

    let escaped = pipeline
        .submit(submission("../etc/passwd"))
        .expect("accepted");
    BatchDispatcher::new(Arc::clone(&pipeline))
        .tick()
        .await
        .expect("tick succeeds");

    // The reference is refused, so the analyst only sees placeholder text and flags it.
    let stored = pipeline.get(&escaped.id).expect("stored");
    assert_eq!(stored.ai_status, AiStatus::Error);
    assert!(stored
        .explanation
        .as_deref()
        .unwrap_or_default()
        .contains("not a résumé"));
}

#[tokio::test]
async fn router_exposes_the_scored_status() {
    let dir = ResumeDir::new();
    dir.write(
        "carla.txt",
        "Carla Mendes Prado\ncarla.prado@example.com\nController with eight years of SAP and IFRS reporting.",
    );
    let (pipeline, _, _) = pipeline(&dir);
    let record = pipeline.submit(submission("carla.txt")).expect("accepted");
    BatchDispatcher::new(Arc::clone(&pipeline))
        .tick()
        .await
        .expect("tick succeeds");

    let response = application_router(Arc::clone(&pipeline))
        .oneshot(
            axum::http::Request::get(format!("/api/v1/applications/{}", record.id))
                .body(axum::body::Body::empty())
                .expect("valid request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    let payload: serde_json::Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["ai_status"], "DONE");
    // 70 * 0.7 + 50 * 0.3 + 60 * 0.1
    assert_eq!(payload["weighted_score"], 70);
}
