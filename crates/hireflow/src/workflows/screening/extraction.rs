use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;

use super::domain::DocumentRef;

/// Placeholder evaluated in place of text that could not be read.
pub const UNREADABLE_SENTINEL: &str =
    "[UNREADABLE DOCUMENT] The résumé text could not be extracted. Evaluate conservatively and \
     treat every requirement as unverified.";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("unsupported document: {0}")]
    Unsupported(String),
    #[error("extraction timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns a stored document reference into plain text.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    async fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError>;
}

/// Reads plain-text résumés below a fixed root directory.
#[derive(Debug, Clone)]
pub struct FilesystemExtractor {
    root: PathBuf,
}

impl FilesystemExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, document: &DocumentRef) -> Result<PathBuf, ExtractionError> {
        let relative = document.0.split('?').next().unwrap_or_default();
        let relative = Path::new(relative.trim_start_matches('/'));

        let escapes_root = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes_root || relative.as_os_str().is_empty() {
            return Err(ExtractionError::Unsupported(format!(
                "document reference '{}' is not a relative path",
                document.0
            )));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ExtractionGateway for FilesystemExtractor {
    async fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError> {
        let path = self.resolve(document)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        if matches!(extension.as_deref(), Some("pdf" | "doc" | "docx")) {
            return Err(ExtractionError::Unsupported(format!(
                "{} requires the document conversion service",
                document.file_name()
            )));
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ExtractionError::NotFound(document.0.clone()))
            }
            Err(err) => Err(ExtractionError::Io(err)),
        }
    }
}

/// Text handed to the AI collaborator, with the raw extraction kept for heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub raw: String,
    pub degraded: bool,
}

impl ExtractedText {
    pub fn readable(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: text.clone(),
            text,
            degraded: false,
        }
    }
}

/// Failed or too-short extractions are the same degraded case: the sentinel replaces the text
/// and evaluation carries on.
pub fn prepare_text(result: Result<String, ExtractionError>, min_chars: usize) -> ExtractedText {
    let raw = match result {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "extraction failed; continuing with sentinel text");
            String::new()
        }
    };

    let trimmed = raw.trim();
    if trimmed.chars().count() < min_chars {
        return ExtractedText {
            text: UNREADABLE_SENTINEL.to_string(),
            raw: trimmed.to_string(),
            degraded: true,
        };
    }

    ExtractedText {
        text: trimmed.to_string(),
        raw: trimmed.to_string(),
        degraded: false,
    }
}

/// Identity guesses pulled straight from résumé text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactHints {
    pub name: Option<String>,
    pub email: Option<String>,
}

const NAME_SCAN_LINES: usize = 5;

/// First e-mail address anywhere in the text; name is the first of the top lines that reads
/// like a person's name.
pub fn contact_hints(text: &str) -> ContactHints {
    ContactHints {
        name: guess_name(text),
        email: guess_email(text),
    }
}

fn guess_email(text: &str) -> Option<String> {
    let pattern = Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").ok()?;
    pattern
        .find(text)
        .map(|found| found.as_str().to_ascii_lowercase())
}

fn guess_name(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(NAME_SCAN_LINES)
        .find(|line| {
            let words = line.split_whitespace().count();
            (2..=6).contains(&words)
                && line.chars().count() <= 60
                && !line.contains('@')
                && !line.chars().any(|ch| ch.is_ascii_digit())
        })
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
}
