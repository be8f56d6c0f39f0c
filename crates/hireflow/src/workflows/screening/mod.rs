//! Candidate screening: résumé intake, leased AI analysis, criteria scoring, and recovery of
//! stalled work.
//!
//! Records move `NEW -> PENDING -> ANALYZING -> {DONE | ERROR | REJECTED}`. Workers coordinate
//! only through conditional writes on the [`ApplicationRepository`]: a claim is a
//! compare-and-set on `PENDING`, every later write must present the worker's lease, and the
//! [`StaleLeaseSweeper`] puts records whose heartbeat went quiet back in the queue.

pub mod analyst;
pub mod dedup;
pub mod dispatcher;
pub mod domain;
pub mod evaluation;
pub mod extraction;
pub mod jobs;
pub mod notify;
pub mod pipeline;
pub mod recovery;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use analyst::{
    AnalysisRequest, AnalystConfig, AnalystError, AnalystResponse, CandidateAnalyst,
    OpenAiAnalyst,
};
pub use dedup::{
    CacheKey, CachedEvaluation, DeduplicationIndex, Fingerprint, InMemoryDeduplicationIndex,
};
pub use dispatcher::{BatchDispatcher, BatchReport};
pub use domain::{
    AiStatus, ApplicationId, ApplicationSubmission, AuditAction, AuditEvent, Criterion,
    DocumentRef, ExecutionStage, JobContext, JobId, PipelineStatus, TokenUsage, WorkerId,
};
pub use evaluation::{
    rank, weighted_score, CriterionResult, EvaluationDecision, EvaluationEngine,
    EvaluationOutcome, EvaluationPayload, EvaluationReport, PayloadError, RankedCandidate,
    ScoreWeights, ScoringConfig,
};
pub use extraction::{
    contact_hints, prepare_text, ContactHints, ExtractedText, ExtractionError,
    ExtractionGateway, FilesystemExtractor, UNREADABLE_SENTINEL,
};
pub use jobs::{InMemoryJobCatalog, JobCatalog};
pub use notify::{LoggingNotifier, Notification, NotificationError, Notifier};
pub use pipeline::{
    AnalysisPipeline, PipelineCollaborators, PipelineConfig, PipelineError, ProcessOutcome,
    SubmissionError,
};
pub use recovery::StaleLeaseSweeper;
pub use repository::{
    ApplicationRecord, ApplicationRepository, ApplicationStatusView,
    InMemoryApplicationRepository, PendingFilter, RepositoryError, WriteGuard,
};
pub use router::application_router;
