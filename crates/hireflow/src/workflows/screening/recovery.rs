use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::domain::{AiStatus, ApplicationId, AuditAction, ExecutionStage};
use super::repository::{ApplicationRepository, RepositoryError, WriteGuard};

/// Periodic task returning abandoned `ANALYZING` records to the queue.
pub struct StaleLeaseSweeper<R> {
    repository: Arc<R>,
    stale_after: Duration,
    interval: Duration,
}

impl<R> StaleLeaseSweeper<R>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(repository: Arc<R>, stale_after: Duration, interval: Duration) -> Self {
        Self {
            repository,
            stale_after,
            interval,
        }
    }

    pub fn sweep(&self) -> Result<Vec<ApplicationId>, RepositoryError> {
        self.sweep_at(Utc::now())
    }

    /// Resets every record whose heartbeat is older than the threshold at `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<Vec<ApplicationId>, RepositoryError> {
        let threshold = chrono::Duration::seconds(self.stale_after.as_secs() as i64);
        let cutoff = now - threshold;

        let stale = self
            .repository
            .with_status(AiStatus::Analyzing, None)?
            .into_iter()
            .filter(|record| record.heartbeat.map(|beat| beat < cutoff).unwrap_or(true));

        let mut recovered = Vec::new();
        for mut record in stale {
            let holder = record
                .claimed_by
                .as_ref()
                .map(|worker| worker.0.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let last_beat = record
                .heartbeat
                .map(|beat| beat.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());

            record.clear_results();
            record.ai_status = AiStatus::Pending;
            record.execution_stage = ExecutionStage::RecoveredStuck;
            record.updated_at = now;
            record.record_event(
                AuditAction::RecoveredStuck,
                now,
                format!("lease of {holder} expired (last heartbeat {last_beat})"),
            );

            let id = record.id.clone();
            match self.repository.write(record, &WriteGuard::StaleBefore(cutoff)) {
                Ok(_) => {
                    tracing::warn!(application_id = %id, worker = %holder, "recovered stuck analysis");
                    recovered.push(id);
                }
                // heartbeat arrived between the scan and the write
                Err(RepositoryError::NotStale(_)) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(recovered)
    }

    /// Sweeps on its own interval until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep() {
                        tracing::error!(error = %err, "stale lease sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("stale lease sweeper stopped");
    }
}
