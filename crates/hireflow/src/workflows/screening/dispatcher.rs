use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use super::domain::AiStatus;
use super::notify::Notifier;
use super::pipeline::{AnalysisPipeline, PipelineError, ProcessOutcome};
use super::repository::{ApplicationRecord, ApplicationRepository, PendingFilter};

/// Tally of one dispatched batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub done: usize,
    pub rejected: usize,
    pub cached: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub lease_lost: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Completed(AiStatus::Rejected) => self.rejected += 1,
            ProcessOutcome::Completed(_) => self.done += 1,
            ProcessOutcome::Cached => self.cached += 1,
            ProcessOutcome::Failed(_) => self.failed += 1,
            ProcessOutcome::Abandoned(_) => self.abandoned += 1,
            ProcessOutcome::LeaseLost => self.lease_lost += 1,
        }
    }
}

/// Claims pending records in bounded batches and runs them under a global concurrency ceiling.
pub struct BatchDispatcher<R, N> {
    pipeline: Arc<AnalysisPipeline<R, N>>,
    filter: PendingFilter,
    permits: Arc<Semaphore>,
}

impl<R, N> BatchDispatcher<R, N>
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(pipeline: Arc<AnalysisPipeline<R, N>>) -> Self {
        let ceiling = pipeline.config().concurrency.max(1);
        Self {
            pipeline,
            filter: PendingFilter::default(),
            permits: Arc::new(Semaphore::new(ceiling)),
        }
    }

    pub fn with_filter(mut self, filter: PendingFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Oldest eligible `PENDING` records, claimed one by one; only successful claims come back.
    pub fn next_batch(&self, max_size: usize) -> Result<Vec<ApplicationRecord>, PipelineError> {
        let candidates = self
            .pipeline
            .repository()
            .pending(&self.filter, max_size)?;

        let mut leases = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.pipeline.claim(&candidate.id) {
                Ok(Some(lease)) => leases.push(lease),
                Ok(None) => {
                    tracing::debug!(application_id = %candidate.id, "claim lost to another worker")
                }
                Err(err) => {
                    tracing::warn!(application_id = %candidate.id, error = %err, "claim failed")
                }
            }
        }
        Ok(leases)
    }

    pub async fn run_batch(&self, leases: Vec<ApplicationRecord>) -> BatchReport {
        let mut report = BatchReport {
            claimed: leases.len(),
            ..BatchReport::default()
        };
        let mut tasks = JoinSet::new();

        for lease in leases {
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return ProcessOutcome::Abandoned("dispatcher closed".to_string()),
                };
                pipeline.process(lease).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(err) => {
                    tracing::error!(error = %err, "analysis task panicked");
                    report.abandoned += 1;
                }
            }
        }

        report
    }

    /// Admit, claim and process one batch.
    pub async fn tick(&self) -> Result<BatchReport, PipelineError> {
        let batch_size = self.pipeline.config().batch_size;
        self.pipeline.admit(batch_size)?;
        let leases = self.next_batch(batch_size)?;
        if leases.is_empty() {
            return Ok(BatchReport::default());
        }

        let report = self.run_batch(leases).await;
        tracing::info!(
            claimed = report.claimed,
            done = report.done,
            rejected = report.rejected,
            cached = report.cached,
            failed = report.failed,
            abandoned = report.abandoned,
            "batch finished"
        );
        Ok(report)
    }

    /// Polls until `shutdown` flips to `true`. Errors are logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let poll_interval = self.pipeline.config().poll_interval;
        tracing::info!(worker = %self.pipeline.worker(), "dispatcher started");

        loop {
            let idle = match self.tick().await {
                Ok(report) => report.claimed == 0,
                Err(err) => {
                    tracing::error!(error = %err, "dispatch failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            } else if *shutdown.borrow() {
                break;
            }
        }

        tracing::info!("dispatcher stopped");
    }
}
