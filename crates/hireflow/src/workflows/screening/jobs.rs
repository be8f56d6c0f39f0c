use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::domain::{JobContext, JobId};
use super::repository::RepositoryError;

/// Source of job titles and criteria handed to the collaborator and the scoring engine.
pub trait JobCatalog: Send + Sync {
    fn job(&self, id: &JobId) -> Result<Option<JobContext>, RepositoryError>;
    fn upsert(&self, job: JobContext) -> Result<JobContext, RepositoryError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryJobCatalog {
    jobs: Arc<RwLock<HashMap<JobId, JobContext>>>,
}

impl InMemoryJobCatalog {
    pub fn with_jobs(jobs: impl IntoIterator<Item = JobContext>) -> Self {
        let catalog = Self::default();
        if let Ok(mut guard) = catalog.jobs.write() {
            for job in jobs {
                guard.insert(job.job_id.clone(), job);
            }
        }
        catalog
    }
}

impl JobCatalog for InMemoryJobCatalog {
    fn job(&self, id: &JobId) -> Result<Option<JobContext>, RepositoryError> {
        let guard = self
            .jobs
            .read()
            .map_err(|_| RepositoryError::Unavailable("job catalog lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    fn upsert(&self, job: JobContext) -> Result<JobContext, RepositoryError> {
        let mut guard = self
            .jobs
            .write()
            .map_err(|_| RepositoryError::Unavailable("job catalog lock poisoned".to_string()))?;
        guard.insert(job.job_id.clone(), job.clone());
        Ok(job)
    }
}
