use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::workflows::screening::analyst::{
    AnalysisRequest, AnalystError, AnalystResponse, CandidateAnalyst,
};
use crate::workflows::screening::dedup::InMemoryDeduplicationIndex;
use crate::workflows::screening::domain::{
    ApplicationSubmission, Criterion, DocumentRef, JobContext, JobId, TokenUsage,
};
use crate::workflows::screening::evaluation::{EvaluationEngine, ScoringConfig};
use crate::workflows::screening::extraction::{ExtractionError, ExtractionGateway};
use crate::workflows::screening::jobs::InMemoryJobCatalog;
use crate::workflows::screening::notify::{Notification, NotificationError, Notifier};
use crate::workflows::screening::pipeline::{
    AnalysisPipeline, PipelineCollaborators, PipelineConfig,
};
use crate::workflows::screening::repository::InMemoryApplicationRepository;

pub(super) const ANALYST_JOB: &str = "job-analyst";

pub(super) const RESUME_TEXT: &str = "Maria Clara Souza\n\
    maria.souza@example.com\n\
    Data analyst with six years of experience in Excel, SQL and Power BI.\n\
    Fluent English, led reporting automation for a retail chain.";

pub(super) fn instant(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn analyst_job() -> JobContext {
    JobContext {
        job_id: JobId(ANALYST_JOB.to_string()),
        title: "Data Analyst".to_string(),
        description: "Reporting and dashboards".to_string(),
        criteria: vec![Criterion::new("Inglês (Obrigatório)"), Criterion::new("Excel")],
    }
}

pub(super) fn submission(document: &str, job: Option<&str>) -> ApplicationSubmission {
    ApplicationSubmission {
        candidate_name: None,
        candidate_email: None,
        job_id: job.map(|job| JobId(job.to_string())),
        document: DocumentRef(document.to_string()),
    }
}

pub(super) fn versioned_payload(verdicts: &[(&str, &str)]) -> String {
    let criteria: serde_json::Map<String, Value> = verdicts
        .iter()
        .map(|(label, verdict)| (label.to_string(), json!(verdict)))
        .collect();
    json!({
        "schema_version": "1.2",
        "candidate_name": "Maria Clara Souza",
        "top_skills": ["Excel", "SQL"],
        "base_scores": {"tecnica": 80, "cultura": 60, "performance": 50, "maturidade": 70},
        "criteria_evaluation": criteria,
        "consolidated_rationale": "Solid analytical profile."
    })
    .to_string()
}

pub(super) fn qualified_payload() -> String {
    versioned_payload(&[("Inglês (Obrigatório)", "ADERE"), ("Excel", "ADERE")])
}

pub(super) fn disqualified_payload() -> String {
    versioned_payload(&[("Inglês (Obrigatório)", "NÃO ADERE"), ("Excel", "ADERE")])
}

/// Extractor serving fixed texts keyed by document reference.
#[derive(Default)]
pub(super) struct StaticExtractor {
    texts: Mutex<HashMap<String, String>>,
}

impl StaticExtractor {
    pub(super) fn with(documents: &[(&str, &str)]) -> Self {
        let texts = documents
            .iter()
            .map(|(document, text)| (document.to_string(), text.to_string()))
            .collect();
        Self {
            texts: Mutex::new(texts),
        }
    }

    /// Makes a document readable, e.g. after the stored file was replaced.
    pub(super) fn put(&self, document: &str, text: &str) {
        self.texts
            .lock()
            .expect("extractor mutex poisoned")
            .insert(document.to_string(), text.to_string());
    }
}

#[async_trait]
impl ExtractionGateway for StaticExtractor {
    async fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError> {
        self.texts
            .lock()
            .expect("extractor mutex poisoned")
            .get(&document.0)
            .cloned()
            .ok_or_else(|| ExtractionError::NotFound(document.0.clone()))
    }
}

pub(super) enum Scripted {
    Reply(String),
    Transient,
    Refused,
}

/// Analyst replaying scripted answers, falling back to a default reply.
pub(super) struct ScriptedAnalyst {
    script: Mutex<VecDeque<Scripted>>,
    default_reply: String,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl ScriptedAnalyst {
    pub(super) fn replying(reply: String) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn then(self, step: Scripted) -> Self {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .push_back(step);
        self
    }

    pub(super) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(super) fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }
}

#[async_trait]
impl CandidateAnalyst for ScriptedAnalyst {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalystResponse, AnalystError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let step = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .pop_front();
        match step {
            Some(Scripted::Reply(raw)) => Ok(AnalystResponse {
                raw,
                usage: TokenUsage {
                    input_tokens: 1200,
                    output_tokens: 300,
                },
            }),
            Some(Scripted::Transient) => Err(AnalystError::Timeout),
            Some(Scripted::Refused) => Err(AnalystError::Rejected {
                status: 400,
                message: "context length exceeded".to_string(),
            }),
            None => Ok(AnalystResponse {
                raw: self.default_reply.clone(),
                usage: TokenUsage {
                    input_tokens: 1200,
                    output_tokens: 300,
                },
            }),
        }
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn publish(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

pub(super) fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        worker_id: "worker-a".to_string(),
        batch_size: 5,
        concurrency: 5,
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_secs(30),
        stale_after: Duration::from_secs(600),
        sweep_interval: Duration::from_secs(60),
        min_text_chars: 50,
    }
}

pub(super) struct Harness {
    pub(super) pipeline: Arc<AnalysisPipeline<InMemoryApplicationRepository, MemoryNotifier>>,
    pub(super) repository: Arc<InMemoryApplicationRepository>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) analyst: Arc<ScriptedAnalyst>,
    pub(super) extractor: Arc<StaticExtractor>,
    pub(super) dedup: Arc<InMemoryDeduplicationIndex>,
    pub(super) jobs: Arc<InMemoryJobCatalog>,
}

pub(super) fn harness(analyst: ScriptedAnalyst, extractor: StaticExtractor) -> Harness {
    harness_with(analyst, extractor, pipeline_config())
}

pub(super) fn harness_with(
    analyst: ScriptedAnalyst,
    extractor: StaticExtractor,
    config: PipelineConfig,
) -> Harness {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let analyst = Arc::new(analyst);
    let extractor = Arc::new(extractor);
    let dedup = Arc::new(InMemoryDeduplicationIndex::default());
    let jobs = Arc::new(InMemoryJobCatalog::with_jobs([analyst_job()]));

    let collaborators = PipelineCollaborators {
        extractor: extractor.clone(),
        analyst: analyst.clone(),
        dedup: dedup.clone(),
        jobs: jobs.clone(),
    };
    let pipeline = Arc::new(AnalysisPipeline::new(
        repository.clone(),
        notifier.clone(),
        collaborators,
        EvaluationEngine::new(ScoringConfig::default()),
        config,
    ));

    Harness {
        pipeline,
        repository,
        notifier,
        analyst,
        extractor,
        dedup,
        jobs,
    }
}

/// Harness with one readable résumé under `resumes/maria.txt`.
pub(super) fn default_harness(reply: String) -> Harness {
    harness(
        ScriptedAnalyst::replying(reply),
        StaticExtractor::with(&[("resumes/maria.txt", RESUME_TEXT)]),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
