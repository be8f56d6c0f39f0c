use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job opening an application is linked to. Applications without one belong to the talent pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the worker process holding a lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer to the stored résumé blob; resolved by the extraction gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

impl DocumentRef {
    /// File name portion of the reference, ignoring any query string.
    pub fn file_name(&self) -> &str {
        let path = self.0.split('?').next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// AI lifecycle status. Serialized in the uppercase form other system parts read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiStatus {
    New,
    Pending,
    Analyzing,
    Done,
    Error,
    Rejected,
}

impl AiStatus {
    pub const ALL: [AiStatus; 6] = [
        AiStatus::New,
        AiStatus::Pending,
        AiStatus::Analyzing,
        AiStatus::Done,
        AiStatus::Error,
        AiStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            AiStatus::New => "NEW",
            AiStatus::Pending => "PENDING",
            AiStatus::Analyzing => "ANALYZING",
            AiStatus::Done => "DONE",
            AiStatus::Error => "ERROR",
            AiStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(value.trim()))
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, AiStatus::Done | AiStatus::Error | AiStatus::Rejected)
    }

    /// Forward edges of the state machine. Requeue and stale-lease recovery are the only
    /// ways back to `Pending`, and both are listed here so every write can be validated.
    pub const fn can_transition_to(self, next: AiStatus) -> bool {
        match (self, next) {
            (AiStatus::New, AiStatus::Pending) => true,
            (AiStatus::Pending, AiStatus::Analyzing) => true,
            (AiStatus::Analyzing, AiStatus::Done)
            | (AiStatus::Analyzing, AiStatus::Error)
            | (AiStatus::Analyzing, AiStatus::Rejected) => true,
            // stale-lease recovery
            (AiStatus::Analyzing, AiStatus::Pending) => true,
            // operator requeue
            (AiStatus::Done, AiStatus::Pending)
            | (AiStatus::Error, AiStatus::Pending)
            | (AiStatus::Rejected, AiStatus::Pending) => true,
            // manual rejection of a scored or failed record
            (AiStatus::Done, AiStatus::Rejected) | (AiStatus::Error, AiStatus::Rejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse hiring funnel stage, owned by recruiters rather than the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    New,
    Screening,
    Qualifying,
    Finalists,
    Rejected,
    Discarded,
}

impl PipelineStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PipelineStatus::New => "new",
            PipelineStatus::Screening => "screening",
            PipelineStatus::Qualifying => "qualifying",
            PipelineStatus::Finalists => "finalists",
            PipelineStatus::Rejected => "rejected",
            PipelineStatus::Discarded => "discarded",
        }
    }

    /// Whether the dispatcher may pick up records in this funnel stage.
    pub const fn accepts_analysis(self) -> bool {
        !matches!(self, PipelineStatus::Rejected | PipelineStatus::Discarded)
    }

    /// Valid `(ai_status, pipeline_status)` pairs. Candidates cannot be advanced in the funnel
    /// before they are scored, and a funnel rejection needs a settled analysis.
    pub const fn permits(self, ai_status: AiStatus) -> bool {
        match self {
            PipelineStatus::New | PipelineStatus::Screening | PipelineStatus::Discarded => true,
            PipelineStatus::Qualifying | PipelineStatus::Finalists => {
                matches!(ai_status, AiStatus::Done)
            }
            PipelineStatus::Rejected => ai_status.is_terminal(),
        }
    }
}

/// Diagnostic label for the last step a worker attempted. Not used for control flow except
/// for the requeue markers that bypass the deduplication cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStage {
    Submitted,
    Admitted,
    Starting,
    Extracting,
    CacheLookup,
    Analyzing,
    Scoring,
    SavingResults,
    Done,
    DoneCached,
    Rejected,
    Error,
    RecoveredStuck,
    QueuedReanalysis,
    ManualRequeue,
    StartingJobAnalysis,
    ClonedFromPool,
    ManuallyRejected,
}

impl ExecutionStage {
    pub const fn label(self) -> &'static str {
        match self {
            ExecutionStage::Submitted => "SUBMITTED",
            ExecutionStage::Admitted => "ADMITTED",
            ExecutionStage::Starting => "STARTING",
            ExecutionStage::Extracting => "EXTRACTING",
            ExecutionStage::CacheLookup => "CACHE_LOOKUP",
            ExecutionStage::Analyzing => "ANALYZING",
            ExecutionStage::Scoring => "SCORING",
            ExecutionStage::SavingResults => "SAVING_RESULTS",
            ExecutionStage::Done => "DONE",
            ExecutionStage::DoneCached => "DONE_CACHED",
            ExecutionStage::Rejected => "REJECTED",
            ExecutionStage::Error => "ERROR",
            ExecutionStage::RecoveredStuck => "RECOVERED_STUCK",
            ExecutionStage::QueuedReanalysis => "QUEUED_REANALYSIS",
            ExecutionStage::ManualRequeue => "MANUAL_REQUEUE",
            ExecutionStage::StartingJobAnalysis => "STARTING_JOB_ANALYSIS",
            ExecutionStage::ClonedFromPool => "CLONED_FROM_POOL",
            ExecutionStage::ManuallyRejected => "MANUALLY_REJECTED",
        }
    }

    /// Stages set by an operator asking for a fresh analysis; cached results are ignored.
    pub const fn bypasses_cache(self) -> bool {
        matches!(
            self,
            ExecutionStage::QueuedReanalysis
                | ExecutionStage::ManualRequeue
                | ExecutionStage::StartingJobAnalysis
        )
    }

    pub const fn is_requeue_marker(self) -> bool {
        matches!(
            self,
            ExecutionStage::QueuedReanalysis | ExecutionStage::ManualRequeue
        )
    }
}

/// Job requirement checked against the résumé.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub label: String,
    /// Explicit eliminatory flag. When absent the label keywords decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminatory: Option<bool>,
}

impl Criterion {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            eliminatory: None,
        }
    }

    pub fn eliminatory(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            eliminatory: Some(true),
        }
    }
}

/// What the AI collaborator is told about the opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: JobId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

/// Discrete lifecycle event kinds recorded on the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Submitted,
    Admitted,
    Claimed,
    ExtractionDegraded,
    CacheReused,
    Evaluated,
    Disqualified,
    Failed,
    RecoveredStuck,
    Requeued,
    ManuallyRejected,
    FeedbackSent,
    ClonedFrom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(action: AuditAction, timestamp: DateTime<Utc>, detail: impl Into<String>) -> Self {
        Self {
            action,
            timestamp,
            detail: detail.into(),
        }
    }
}

/// Token accounting reported by the AI collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Inbound submission accepted by the intake surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub candidate_email: Option<String>,
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub document: DocumentRef,
}
