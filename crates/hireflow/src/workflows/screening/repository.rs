use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dedup::Fingerprint;
use super::domain::{
    AiStatus, ApplicationId, ApplicationSubmission, AuditAction, AuditEvent, DocumentRef,
    ExecutionStage, JobId, PipelineStatus, TokenUsage, WorkerId,
};
use super::evaluation::{weighted_score, EvaluationReport, ScoreWeights};

/// One candidate submission and its evolving analysis state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub job_id: Option<JobId>,
    pub document: DocumentRef,
    pub fingerprint: Option<Fingerprint>,
    pub ai_status: AiStatus,
    pub pipeline_status: PipelineStatus,
    pub execution_stage: ExecutionStage,
    pub heartbeat: Option<DateTime<Utc>>,
    pub claimed_by: Option<WorkerId>,
    pub score: Option<u8>,
    pub evaluation: Option<EvaluationReport>,
    pub explanation: Option<String>,
    pub usage: TokenUsage,
    pub audit_log: Vec<AuditEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn from_submission(submission: ApplicationSubmission, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            id: ApplicationId::generate(),
            candidate_name: submission.candidate_name.filter(|name| !name.trim().is_empty()),
            candidate_email: submission
                .candidate_email
                .filter(|email| !email.trim().is_empty()),
            job_id: submission.job_id,
            document: submission.document,
            fingerprint: None,
            ai_status: AiStatus::New,
            pipeline_status: PipelineStatus::New,
            execution_stage: ExecutionStage::Submitted,
            heartbeat: None,
            claimed_by: None,
            score: None,
            evaluation: None,
            explanation: None,
            usage: TokenUsage::default(),
            audit_log: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        record.record_event(AuditAction::Submitted, now, "application received");
        record
    }

    pub fn record_event(
        &mut self,
        action: AuditAction,
        timestamp: DateTime<Utc>,
        detail: impl Into<String>,
    ) {
        self.audit_log
            .push(AuditEvent::new(action, timestamp, detail));
    }

    /// Score only counts once the analysis finished.
    pub fn trusted_score(&self) -> Option<u8> {
        match self.ai_status {
            AiStatus::Done => self.score,
            _ => None,
        }
    }

    pub fn weighted_score(&self, weights: ScoreWeights) -> u32 {
        weighted_score(
            self.ai_status,
            self.evaluation.as_ref().map(|report| &report.payload),
            self.score,
            weights,
        )
    }

    pub fn holds_lease(&self, worker: &WorkerId) -> bool {
        self.ai_status == AiStatus::Analyzing && self.claimed_by.as_ref() == Some(worker)
    }

    pub fn release_lease(&mut self) {
        self.heartbeat = None;
        self.claimed_by = None;
    }

    /// Drops everything an analysis produced so the next run starts clean. The fingerprint stays.
    pub fn clear_results(&mut self) {
        self.score = None;
        self.evaluation = None;
        self.explanation = None;
        self.usage = TokenUsage::default();
        self.release_lease();
    }

    pub fn status_view(&self, weights: ScoreWeights) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            ai_status: self.ai_status.label(),
            pipeline_status: self.pipeline_status.label(),
            execution_stage: self.execution_stage.label(),
            job_id: self.job_id.clone(),
            candidate_name: self.candidate_name.clone(),
            candidate_email: self.candidate_email.clone(),
            score: self.trusted_score(),
            weighted_score: self.weighted_score(weights),
            explanation: self.explanation.clone(),
            heartbeat: self.heartbeat,
            usage: self.usage,
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub ai_status: &'static str,
    pub pipeline_status: &'static str,
    pub execution_stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    pub weighted_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<DateTime<Utc>>,
    pub usage: TokenUsage,
}

/// Precondition attached to a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteGuard {
    /// Stored status must still be this one.
    Status(AiStatus),
    /// Writer must hold the lease on an `ANALYZING` record.
    Lease(WorkerId),
    /// Record must still be `ANALYZING` with a heartbeat older than the cutoff.
    StaleBefore(DateTime<Utc>),
}

/// Which pending records the dispatcher wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingFilter {
    pub job_id: Option<JobId>,
    /// Only records put back in the queue by an operator.
    pub requeued_only: bool,
}

impl PendingFilter {
    pub fn for_job(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            requeued_only: false,
        }
    }

    pub fn requeued() -> Self {
        Self {
            job_id: None,
            requeued_only: true,
        }
    }

    fn matches(&self, record: &ApplicationRecord) -> bool {
        record.ai_status == AiStatus::Pending
            && record.pipeline_status.accepts_analysis()
            && self
                .job_id
                .as_ref()
                .map(|job| record.job_id.as_ref() == Some(job))
                .unwrap_or(true)
            && (!self.requeued_only || record.execution_stage.is_requeue_marker())
    }
}

/// Storage abstraction. Workers coordinate only through the conditional operations here.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Replaces the stored record when the guard holds and the change is a legal transition.
    fn write(
        &self,
        record: ApplicationRecord,
        guard: &WriteGuard,
    ) -> Result<ApplicationRecord, RepositoryError>;
    /// `PENDING -> ANALYZING` compare-and-set. `None` when another worker got there first.
    fn claim(
        &self,
        id: &ApplicationId,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Heartbeat refresh, optionally moving the diagnostic stage.
    fn touch(
        &self,
        id: &ApplicationId,
        worker: &WorkerId,
        stage: Option<ExecutionStage>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Oldest first.
    fn pending(
        &self,
        filter: &PendingFilter,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    /// Oldest first, optionally restricted to one job.
    fn with_status(
        &self,
        status: AiStatus,
        job_id: Option<&JobId>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("lease on {0} is held by another worker or expired")]
    LeaseLost(ApplicationId),
    #[error("expected status {expected}, found {found}")]
    StatusChanged { expected: AiStatus, found: AiStatus },
    #[error("record {0} is no longer stale")]
    NotStale(ApplicationId),
    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: AiStatus, to: AiStatus },
    #[error("ai status {ai_status} is not allowed in funnel stage {pipeline_status}")]
    InvalidCombination {
        ai_status: AiStatus,
        pipeline_status: &'static str,
    },
    #[error("fingerprint of {0} is already set")]
    FingerprintImmutable(ApplicationId),
}

fn check_guard(stored: &ApplicationRecord, guard: &WriteGuard) -> Result<(), RepositoryError> {
    match guard {
        WriteGuard::Status(expected) if stored.ai_status != *expected => {
            Err(RepositoryError::StatusChanged {
                expected: *expected,
                found: stored.ai_status,
            })
        }
        WriteGuard::Lease(worker) if !stored.holds_lease(worker) => {
            Err(RepositoryError::LeaseLost(stored.id.clone()))
        }
        WriteGuard::StaleBefore(cutoff) => {
            let stale = stored.ai_status == AiStatus::Analyzing
                && stored
                    .heartbeat
                    .map(|heartbeat| heartbeat < *cutoff)
                    .unwrap_or(true);
            if stale {
                Ok(())
            } else {
                Err(RepositoryError::NotStale(stored.id.clone()))
            }
        }
        _ => Ok(()),
    }
}

/// Invariants every stored record must keep regardless of who writes it.
pub fn validate_change(
    stored: &ApplicationRecord,
    next: &ApplicationRecord,
) -> Result<(), RepositoryError> {
    if stored.ai_status != next.ai_status && !stored.ai_status.can_transition_to(next.ai_status) {
        return Err(RepositoryError::InvalidTransition {
            from: stored.ai_status,
            to: next.ai_status,
        });
    }

    if !next.pipeline_status.permits(next.ai_status) {
        return Err(RepositoryError::InvalidCombination {
            ai_status: next.ai_status,
            pipeline_status: next.pipeline_status.label(),
        });
    }

    if let Some(fingerprint) = &stored.fingerprint {
        if next.fingerprint.as_ref() != Some(fingerprint) {
            return Err(RepositoryError::FingerprintImmutable(stored.id.clone()));
        }
    }

    Ok(())
}

/// Process-local store used by the binaries and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl InMemoryApplicationRepository {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ApplicationId, ApplicationRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }

    fn oldest_first(mut records: Vec<ApplicationRecord>) -> Vec<ApplicationRecord> {
        records.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        records
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        if !record.pipeline_status.permits(record.ai_status) {
            return Err(RepositoryError::InvalidCombination {
                ai_status: record.ai_status,
                pipeline_status: record.pipeline_status.label(),
            });
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn write(
        &self,
        record: ApplicationRecord,
        write_guard: &WriteGuard,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.lock()?;
        let stored = guard.get(&record.id).ok_or(RepositoryError::NotFound)?;
        check_guard(stored, write_guard)?;
        validate_change(stored, &record)?;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn claim(
        &self,
        id: &ApplicationId,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let mut guard = self.lock()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if record.ai_status != AiStatus::Pending || !record.pipeline_status.accepts_analysis() {
            return Ok(None);
        }

        record.ai_status = AiStatus::Analyzing;
        record.heartbeat = Some(now);
        record.claimed_by = Some(worker.clone());
        record.updated_at = now;
        record.record_event(AuditAction::Claimed, now, format!("claimed by {worker}"));
        Ok(Some(record.clone()))
    }

    fn touch(
        &self,
        id: &ApplicationId,
        worker: &WorkerId,
        stage: Option<ExecutionStage>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !record.holds_lease(worker) {
            return Err(RepositoryError::LeaseLost(id.clone()));
        }

        record.heartbeat = Some(now);
        record.updated_at = now;
        if let Some(stage) = stage {
            record.execution_stage = stage;
        }
        Ok(())
    }

    fn pending(
        &self,
        filter: &PendingFilter,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.lock()?;
        let matching = guard
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        let mut ordered = Self::oldest_first(matching);
        ordered.truncate(limit);
        Ok(ordered)
    }

    fn with_status(
        &self,
        status: AiStatus,
        job_id: Option<&JobId>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.lock()?;
        let matching = guard
            .values()
            .filter(|record| record.ai_status == status)
            .filter(|record| job_id.map(|job| record.job_id.as_ref() == Some(job)).unwrap_or(true))
            .cloned()
            .collect();
        Ok(Self::oldest_first(matching))
    }
}
