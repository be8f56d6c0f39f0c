use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::domain::JobId;
use super::evaluation::EvaluationReport;
use super::repository::RepositoryError;

/// SHA-256 of the trimmed extracted text, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.trim().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const TALENT_POOL_SCOPE: &str = "talent-pool";

/// Cache key: the same text scored against another job or rubric revision is a miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: Fingerprint,
    pub scope: String,
}

impl CacheKey {
    pub fn new(fingerprint: Fingerprint, job_id: Option<&JobId>, revision: &str) -> Self {
        let target = job_id.map(|job| job.0.as_str()).unwrap_or(TALENT_POOL_SCOPE);
        Self {
            fingerprint,
            scope: format!("{target}@{revision}"),
        }
    }
}

/// Result copied onto applications whose text was already evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEvaluation {
    pub score: u8,
    pub explanation: String,
    pub report: EvaluationReport,
}

pub trait DeduplicationIndex: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEvaluation>, RepositoryError>;
    /// Last write for a key wins, so a reanalysis replaces what it supersedes.
    fn store(&self, key: CacheKey, evaluation: CachedEvaluation) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDeduplicationIndex {
    entries: Arc<RwLock<HashMap<CacheKey, CachedEvaluation>>>,
}

impl InMemoryDeduplicationIndex {
    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeduplicationIndex for InMemoryDeduplicationIndex {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEvaluation>, RepositoryError> {
        let guard = self
            .entries
            .read()
            .map_err(|_| RepositoryError::Unavailable("dedup index lock poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn store(&self, key: CacheKey, evaluation: CachedEvaluation) -> Result<(), RepositoryError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| RepositoryError::Unavailable("dedup index lock poisoned".to_string()))?;
        guard.insert(key, evaluation);
        Ok(())
    }
}
