use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use super::analyst::{AnalysisRequest, CandidateAnalyst};
use super::dedup::{CacheKey, CachedEvaluation, DeduplicationIndex, Fingerprint};
use super::domain::{
    AiStatus, ApplicationId, ApplicationSubmission, AuditAction, AuditEvent, ExecutionStage,
    JobId, PipelineStatus, TokenUsage, WorkerId,
};
use super::evaluation::{rank, EvaluationEngine, EvaluationPayload, RankedCandidate};
use super::extraction::{contact_hints, prepare_text, ExtractionGateway};
use super::jobs::JobCatalog;
use super::notify::{
    publish_quietly, Notification, Notifier, AUTOMATIC_REJECTION_TEMPLATE, FEEDBACK_TEMPLATE,
};
use super::repository::{
    ApplicationRecord, ApplicationRepository, RepositoryError, WriteGuard,
};

/// Worker, batching and lease timing knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub worker_id: String,
    pub batch_size: usize,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
    pub sweep_interval: Duration,
    pub min_text_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            batch_size: 5,
            concurrency: 5,
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            min_text_chars: 50,
        }
    }
}

/// Async collaborators the orchestrator calls out to.
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub extractor: Arc<dyn ExtractionGateway>,
    pub analyst: Arc<dyn CandidateAnalyst>,
    pub dedup: Arc<dyn DeduplicationIndex>,
    pub jobs: Arc<dyn JobCatalog>,
}

/// How a leased record left the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Scored and written as `DONE` or `REJECTED`.
    Completed(AiStatus),
    /// Result copied from an earlier evaluation of the same text.
    Cached,
    /// Written as `ERROR`.
    Failed(String),
    /// Nothing written; the sweep will hand the record out again.
    Abandoned(String),
    LeaseLost,
}

#[derive(Debug)]
enum StageFailure {
    Transient(String),
    Permanent(String),
    LeaseLost,
}

impl From<RepositoryError> for StageFailure {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::LeaseLost(_) => StageFailure::LeaseLost,
            RepositoryError::Unavailable(reason) => StageFailure::Transient(reason),
            other => StageFailure::Permanent(other.to_string()),
        }
    }
}

/// Orchestrator owning every `ai_status` transition except stale-lease recovery.
pub struct AnalysisPipeline<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    collaborators: PipelineCollaborators,
    engine: EvaluationEngine,
    config: PipelineConfig,
    worker: WorkerId,
}

impl<R, N> AnalysisPipeline<R, N>
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        collaborators: PipelineCollaborators,
        engine: EvaluationEngine,
        config: PipelineConfig,
    ) -> Self {
        let worker = WorkerId(config.worker_id.clone());
        Self {
            repository,
            notifier,
            collaborators,
            engine,
            config,
            worker,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &EvaluationEngine {
        &self.engine
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn jobs(&self) -> &Arc<dyn JobCatalog> {
        &self.collaborators.jobs
    }

    /// Store a new application as `NEW`.
    pub fn submit(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationRecord, PipelineError> {
        if submission.document.0.trim().is_empty() {
            return Err(SubmissionError::MissingDocument.into());
        }
        if let Some(email) = submission.candidate_email.as_deref() {
            let email = email.trim();
            if !email.is_empty() && !email.contains('@') {
                return Err(SubmissionError::InvalidEmail(email.to_string()).into());
            }
        }
        if let Some(job_id) = &submission.job_id {
            if self.collaborators.jobs.job(job_id)?.is_none() {
                return Err(PipelineError::UnknownJob(job_id.clone()));
            }
        }

        let record = ApplicationRecord::from_submission(submission, Utc::now());
        let stored = self.repository.insert(record)?;
        tracing::info!(
            application_id = %stored.id,
            job_id = stored.job_id.as_ref().map(|job| job.0.as_str()).unwrap_or("talent-pool"),
            "application submitted"
        );
        Ok(stored)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, PipelineError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| PipelineError::NotFound(id.clone()))
    }

    /// `NEW -> PENDING` for records that carry a document reference.
    pub fn admit(&self, limit: usize) -> Result<usize, PipelineError> {
        let candidates = self.repository.with_status(AiStatus::New, None)?;
        let mut admitted = 0;

        for mut record in candidates
            .into_iter()
            .filter(|record| {
                !record.document.0.trim().is_empty() && record.pipeline_status.accepts_analysis()
            })
            .take(limit)
        {
            let now = Utc::now();
            record.ai_status = AiStatus::Pending;
            record.execution_stage = ExecutionStage::Admitted;
            record.updated_at = now;
            record.record_event(AuditAction::Admitted, now, "queued for analysis");

            match self
                .repository
                .write(record, &WriteGuard::Status(AiStatus::New))
            {
                Ok(_) => admitted += 1,
                Err(RepositoryError::StatusChanged { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        if admitted > 0 {
            tracing::debug!(admitted, "admitted new applications");
        }
        Ok(admitted)
    }

    /// Conditional `PENDING -> ANALYZING`; `None` when the record was taken by someone else.
    pub fn claim(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, PipelineError> {
        Ok(self.repository.claim(id, &self.worker, Utc::now())?)
    }

    /// Drive one leased record to a terminal state, refreshing its heartbeat while the stages run.
    /// Never fails: every problem is logged and folded into the outcome.
    pub async fn process(&self, record: ApplicationRecord) -> ProcessOutcome {
        let span = tracing::info_span!(
            "analysis",
            application_id = %record.id,
            worker = %self.worker
        );
        self.process_leased(record).instrument(span).await
    }

    async fn process_leased(&self, record: ApplicationRecord) -> ProcessOutcome {
        let id = record.id.clone();
        let work = self.analyze(record);
        tokio::pin!(work);

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let result = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = heartbeat.tick() => {
                    if let Err(err) = self.repository.touch(&id, &self.worker, None, Utc::now()) {
                        tracing::warn!(error = %err, "heartbeat refresh failed");
                    }
                }
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(StageFailure::Transient(reason)) => {
                tracing::warn!(%reason, "transient failure; lease left to expire");
                ProcessOutcome::Abandoned(reason)
            }
            Err(StageFailure::LeaseLost) => {
                tracing::warn!("lease lost; discarding work");
                ProcessOutcome::LeaseLost
            }
            Err(StageFailure::Permanent(reason)) => self.fail(&id, reason),
        }
    }

    async fn analyze(&self, record: ApplicationRecord) -> Result<ProcessOutcome, StageFailure> {
        let id = record.id.clone();
        let bypass_cache = record.execution_stage.bypasses_cache();
        let mut events = Vec::new();

        self.stage(&id, ExecutionStage::Starting)?;
        let job = match &record.job_id {
            Some(job_id) => Some(
                self.collaborators
                    .jobs
                    .job(job_id)?
                    .ok_or_else(|| StageFailure::Permanent(format!("job {job_id} no longer exists")))?,
            ),
            None => None,
        };
        let criteria = job
            .as_ref()
            .map(|job| job.criteria.clone())
            .unwrap_or_default();

        self.stage(&id, ExecutionStage::Extracting)?;
        let extracted = self.collaborators.extractor.extract(&record.document).await;
        let text = prepare_text(extracted, self.config.min_text_chars);
        if text.degraded {
            events.push(AuditEvent::new(
                AuditAction::ExtractionDegraded,
                Utc::now(),
                "résumé text unreadable; evaluated placeholder text",
            ));
        }

        // Only readable text is fingerprinted: a failed extraction hashes to the empty string
        // and placeholder text would make every unreadable résumé collide.
        let fingerprint = (!text.degraded).then(|| {
            record
                .fingerprint
                .clone()
                .unwrap_or_else(|| Fingerprint::of(&text.raw))
        });
        let cache_key = fingerprint.as_ref().map(|fingerprint| {
            CacheKey::new(
                fingerprint.clone(),
                record.job_id.as_ref(),
                &self.engine.config().revision,
            )
        });

        if let Some((fingerprint, key)) = fingerprint
            .as_ref()
            .zip(cache_key.as_ref())
            .filter(|_| !bypass_cache)
        {
            self.stage(&id, ExecutionStage::CacheLookup)?;
            match self.collaborators.dedup.lookup(key) {
                Ok(Some(cached)) => return self.reuse(&id, fingerprint.clone(), cached, events),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "dedup lookup failed; analysing"),
            }
        }

        self.stage(&id, ExecutionStage::Analyzing)?;
        let request = AnalysisRequest {
            application_id: id.clone(),
            text: text.text.clone(),
            degraded: text.degraded,
            job,
        };
        let response = self
            .collaborators
            .analyst
            .analyze(&request)
            .await
            .map_err(|err| {
                if err.is_transient() {
                    StageFailure::Transient(err.to_string())
                } else {
                    StageFailure::Permanent(err.to_string())
                }
            })?;

        self.stage(&id, ExecutionStage::Scoring)?;
        let payload = EvaluationPayload::parse(&response.raw)
            .map_err(|err| StageFailure::Permanent(err.to_string()))?;
        if payload.declares_non_resume() {
            return Err(StageFailure::Permanent(
                "the document is not a résumé".to_string(),
            ));
        }

        let hints = contact_hints(&text.raw);
        let name = payload.candidate_name().map(str::to_string).or(hints.name);
        let email = payload
            .candidate_email()
            .map(str::to_ascii_lowercase)
            .or(hints.email);

        let outcome = self.engine.evaluate(&text, &criteria, payload);
        let status = if outcome.disqualified() {
            AiStatus::Rejected
        } else {
            AiStatus::Done
        };

        self.stage(&id, ExecutionStage::SavingResults)?;
        let now = Utc::now();
        events.push(AuditEvent::new(
            if outcome.disqualified() {
                AuditAction::Disqualified
            } else {
                AuditAction::Evaluated
            },
            now,
            format!("{} (score {})", outcome.decision.summary(), outcome.score),
        ));

        let saved = self.commit(&id, |stored| {
            stored.ai_status = status;
            stored.execution_stage = if status == AiStatus::Rejected {
                ExecutionStage::Rejected
            } else {
                ExecutionStage::Done
            };
            if stored.fingerprint.is_none() {
                stored.fingerprint = fingerprint;
            }
            stored.score = Some(outcome.score);
            stored.evaluation = Some(outcome.report.clone());
            stored.explanation = Some(outcome.explanation.clone());
            stored.usage = response.usage;
            fill_identity(stored, name, email);
            stored.release_lease();
            stored.updated_at = now;
            stored.audit_log.extend(events);
        })?;

        tracing::info!(
            status = %saved.ai_status,
            score = outcome.score,
            tokens = saved.usage.total(),
            degraded = text.degraded,
            "analysis finished"
        );

        match status {
            AiStatus::Done => {
                if let Some(key) = cache_key {
                    let cached = CachedEvaluation {
                        score: outcome.score,
                        explanation: outcome.explanation,
                        report: outcome.report,
                    };
                    if let Err(err) = self.collaborators.dedup.store(key, cached) {
                        tracing::warn!(error = %err, "could not cache evaluation");
                    }
                }
            }
            _ => self.notify_automatic_rejection(&saved),
        }

        Ok(ProcessOutcome::Completed(status))
    }

    fn reuse(
        &self,
        id: &ApplicationId,
        fingerprint: Fingerprint,
        cached: CachedEvaluation,
        mut events: Vec<AuditEvent>,
    ) -> Result<ProcessOutcome, StageFailure> {
        let now = Utc::now();
        events.push(AuditEvent::new(
            AuditAction::CacheReused,
            now,
            format!("reused evaluation of identical résumé {fingerprint}"),
        ));

        let name = cached.report.payload.candidate_name().map(str::to_string);
        let email = cached
            .report
            .payload
            .candidate_email()
            .map(str::to_ascii_lowercase);

        self.commit(id, |stored| {
            stored.ai_status = AiStatus::Done;
            stored.execution_stage = ExecutionStage::DoneCached;
            if stored.fingerprint.is_none() {
                stored.fingerprint = Some(fingerprint);
            }
            stored.score = Some(cached.score);
            stored.evaluation = Some(cached.report);
            stored.explanation = Some(cached.explanation);
            stored.usage = TokenUsage::default();
            fill_identity(stored, name, email);
            stored.release_lease();
            stored.updated_at = now;
            stored.audit_log.extend(events);
        })?;

        tracing::info!("reused cached evaluation");
        Ok(ProcessOutcome::Cached)
    }

    fn fail(&self, id: &ApplicationId, reason: String) -> ProcessOutcome {
        let now = Utc::now();
        let detail = reason.clone();
        let result = self.commit(id, |stored| {
            stored.ai_status = AiStatus::Error;
            stored.execution_stage = ExecutionStage::Error;
            stored.score = None;
            stored.evaluation = None;
            stored.explanation = Some(format!("Analysis failed: {detail}"));
            stored.release_lease();
            stored.updated_at = now;
            stored.record_event(AuditAction::Failed, now, detail);
        });

        match result {
            Ok(_) => {
                tracing::warn!(%reason, "analysis failed permanently");
                ProcessOutcome::Failed(reason)
            }
            Err(RepositoryError::LeaseLost(_)) => ProcessOutcome::LeaseLost,
            Err(err) => {
                tracing::error!(error = %err, %reason, "could not record failure; lease left to expire");
                ProcessOutcome::Abandoned(err.to_string())
            }
        }
    }

    fn stage(&self, id: &ApplicationId, stage: ExecutionStage) -> Result<(), StageFailure> {
        tracing::debug!(stage = stage.label(), "stage");
        self.repository
            .touch(id, &self.worker, Some(stage), Utc::now())
            .map_err(StageFailure::from)
    }

    /// Lease-checked read-modify-write so concurrent operator edits to other fields survive.
    fn commit(
        &self,
        id: &ApplicationId,
        mutate: impl FnOnce(&mut ApplicationRecord),
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut record = self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        if !record.holds_lease(&self.worker) {
            return Err(RepositoryError::LeaseLost(id.clone()));
        }
        mutate(&mut record);
        self.repository
            .write(record, &WriteGuard::Lease(self.worker.clone()))
    }

    fn notify_automatic_rejection(&self, record: &ApplicationRecord) {
        let failed = record
            .evaluation
            .as_ref()
            .map(|report| {
                report
                    .criteria
                    .iter()
                    .filter(|criterion| criterion.eliminatory && !criterion.satisfied)
                    .map(|criterion| criterion.label.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        let mut details = BTreeMap::new();
        details.insert("failed_criteria".to_string(), failed);
        if let Some(name) = &record.candidate_name {
            details.insert("candidate_name".to_string(), name.clone());
        }

        publish_quietly(
            self.notifier.as_ref(),
            Notification {
                template: AUTOMATIC_REJECTION_TEMPLATE.to_string(),
                application_id: record.id.clone(),
                job_id: record.job_id.clone(),
                recipient: record.candidate_email.clone(),
                details,
            },
        );
    }

    /// Operator requeue of a single settled record.
    pub fn requeue(&self, id: &ApplicationId) -> Result<ApplicationRecord, PipelineError> {
        let record = self.get(id)?;
        let requeued = self.requeue_record(record, ExecutionStage::ManualRequeue)?;
        tracing::info!(application_id = %id, "application requeued");
        Ok(requeued)
    }

    /// Requeue every settled record of a job, e.g. after its criteria changed.
    pub fn requeue_job(&self, job_id: &JobId) -> Result<usize, PipelineError> {
        if self.collaborators.jobs.job(job_id)?.is_none() {
            return Err(PipelineError::UnknownJob(job_id.clone()));
        }

        let mut requeued = 0;
        for status in [AiStatus::Done, AiStatus::Error, AiStatus::Rejected] {
            for record in self.repository.with_status(status, Some(job_id))? {
                let id = record.id.clone();
                match self.requeue_record(record, ExecutionStage::QueuedReanalysis) {
                    Ok(_) => requeued += 1,
                    Err(err) => {
                        tracing::warn!(application_id = %id, error = %err, "skipped during job requeue")
                    }
                }
            }
        }

        tracing::info!(job_id = %job_id, requeued, "job queued for reanalysis");
        Ok(requeued)
    }

    fn requeue_record(
        &self,
        mut record: ApplicationRecord,
        stage: ExecutionStage,
    ) -> Result<ApplicationRecord, PipelineError> {
        let previous = record.ai_status;
        if !previous.is_terminal() {
            return Err(PipelineError::InvalidState {
                id: record.id,
                status: previous,
                action: "requeue",
            });
        }

        let now = Utc::now();
        record.clear_results();
        record.ai_status = AiStatus::Pending;
        record.execution_stage = stage;
        // A fresh analysis reopens the candidate's funnel stage.
        if !matches!(
            record.pipeline_status,
            PipelineStatus::New | PipelineStatus::Screening
        ) {
            record.pipeline_status = PipelineStatus::Screening;
        }
        record.updated_at = now;
        record.record_event(
            AuditAction::Requeued,
            now,
            format!("{previous} -> PENDING ({})", stage.label()),
        );

        Ok(self
            .repository
            .write(record, &WriteGuard::Status(previous))?)
    }

    /// Manual rejection of a settled record, with feedback sent to the candidate.
    pub fn reject_with_feedback(
        &self,
        id: &ApplicationId,
        feedback: &str,
    ) -> Result<ApplicationRecord, PipelineError> {
        let mut record = self.get(id)?;
        let previous = record.ai_status;
        // Automatic rejections may still be followed by operator feedback.
        if previous != AiStatus::Rejected && !previous.can_transition_to(AiStatus::Rejected) {
            return Err(PipelineError::InvalidState {
                id: record.id,
                status: previous,
                action: "reject",
            });
        }

        let feedback = feedback.trim();
        let now = Utc::now();
        record.ai_status = AiStatus::Rejected;
        record.pipeline_status = PipelineStatus::Rejected;
        record.execution_stage = ExecutionStage::ManuallyRejected;
        if !feedback.is_empty() {
            record.explanation = Some(feedback.to_string());
        }
        record.updated_at = now;
        let recipient = record
            .candidate_email
            .clone()
            .unwrap_or_else(|| "no recipient".to_string());
        record.record_event(AuditAction::ManuallyRejected, now, format!("was {previous}"));
        record.record_event(AuditAction::FeedbackSent, now, recipient);

        let stored = self
            .repository
            .write(record, &WriteGuard::Status(previous))?;

        let mut details = BTreeMap::new();
        details.insert("feedback".to_string(), feedback.to_string());
        publish_quietly(
            self.notifier.as_ref(),
            Notification {
                template: FEEDBACK_TEMPLATE.to_string(),
                application_id: stored.id.clone(),
                job_id: stored.job_id.clone(),
                recipient: stored.candidate_email.clone(),
                details,
            },
        );

        tracing::info!(application_id = %id, "application rejected by operator");
        Ok(stored)
    }

    /// Copy a candidate into a job (queued for a fresh analysis) or, without a job, duplicate a
    /// finished talent-pool result.
    pub fn clone_to_job(
        &self,
        id: &ApplicationId,
        target: Option<&JobId>,
    ) -> Result<ApplicationRecord, PipelineError> {
        let source = self.get(id)?;
        if let Some(job_id) = target {
            if self.collaborators.jobs.job(job_id)?.is_none() {
                return Err(PipelineError::UnknownJob(job_id.clone()));
            }
        }

        let now = Utc::now();
        let mut clone = ApplicationRecord::from_submission(
            ApplicationSubmission {
                candidate_name: source.candidate_name.clone(),
                candidate_email: source.candidate_email.clone(),
                job_id: target.cloned(),
                document: source.document.clone(),
            },
            now,
        );
        clone.fingerprint = source.fingerprint.clone();

        match target {
            Some(_) => {
                clone.ai_status = AiStatus::Pending;
                clone.execution_stage = ExecutionStage::StartingJobAnalysis;
            }
            None => {
                if source.ai_status != AiStatus::Done {
                    return Err(PipelineError::InvalidState {
                        id: source.id,
                        status: source.ai_status,
                        action: "clone",
                    });
                }
                clone.ai_status = AiStatus::Done;
                clone.execution_stage = ExecutionStage::ClonedFromPool;
                clone.score = source.score;
                clone.evaluation = source.evaluation.clone();
                clone.explanation = source.explanation.clone();
                clone.usage = source.usage;
            }
        }
        clone.record_event(
            AuditAction::ClonedFrom,
            now,
            format!("cloned from {}", source.id),
        );

        let stored = self.repository.insert(clone)?;
        tracing::info!(
            application_id = %stored.id,
            source = %source.id,
            "application cloned"
        );
        Ok(stored)
    }

    pub fn ranking(&self, job_id: &JobId) -> Result<Vec<RankedCandidate>, PipelineError> {
        let scored = self.repository.with_status(AiStatus::Done, Some(job_id))?;
        Ok(rank(&scored, self.engine.config().weights))
    }
}

fn fill_identity(record: &mut ApplicationRecord, name: Option<String>, email: Option<String>) {
    if record.candidate_name.is_none() {
        record.candidate_name = name;
    }
    if record.candidate_email.is_none() {
        record.candidate_email = email;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("a document reference is required")]
    MissingDocument,
    #[error("'{0}' is not an e-mail address")]
    InvalidEmail(String),
}

/// Error raised by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("job {0} not found")]
    UnknownJob(JobId),
    #[error("cannot {action} application {id} while it is {status}")]
    InvalidState {
        id: ApplicationId,
        status: AiStatus,
        action: &'static str,
    },
}
