//! AI collaborator boundary and the OpenAI chat-completions client behind it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, JobContext, TokenUsage};

/// What the collaborator needs to assess one résumé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub application_id: ApplicationId,
    pub text: String,
    pub degraded: bool,
    pub job: Option<JobContext>,
}

/// Raw JSON text as returned, validated later by the scoring engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalystResponse {
    pub raw: String,
    pub usage: TokenUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalystError {
    #[error("AI collaborator is not configured: {0}")]
    NotConfigured(String),
    #[error("AI request timed out")]
    Timeout,
    #[error("AI transport failure: {0}")]
    Transport(String),
    #[error("AI rate limit reached")]
    RateLimited,
    #[error("AI service error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("AI request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl AnalystError {
    /// Transient failures leave the lease to expire so the sweep retries the record later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalystError::Timeout
                | AnalystError::Transport(_)
                | AnalystError::RateLimited
                | AnalystError::Upstream { .. }
        )
    }
}

#[async_trait]
pub trait CandidateAnalyst: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalystResponse, AnalystError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalystConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

const SYSTEM_PROMPT: &str = "You are a senior technical recruiter. Read the résumé and answer \
with a single JSON object using schema_version \"1.2\" and the fields candidate_name, \
candidate_email, is_resume, top_skills, professional_summary, estimated_seniority, base_scores \
(tecnica, cultura, performance, maturidade, each 0-100), real_gaps, criteria_evaluation (one \
entry per listed criterion, value ADERE or NÃO ADERE) and consolidated_rationale. Only mark a \
criterion ADERE when the résumé shows explicit evidence.";

pub(crate) fn user_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = String::new();
    match &request.job {
        Some(job) => {
            prompt.push_str(&format!("Job: {}\n", job.title));
            if !job.description.trim().is_empty() {
                prompt.push_str(&format!("Description: {}\n", job.description.trim()));
            }
            if job.criteria.is_empty() {
                prompt.push_str("Criteria: none listed\n");
            } else {
                prompt.push_str("Criteria:\n");
                for criterion in &job.criteria {
                    prompt.push_str(&format!("- {}\n", criterion.label));
                }
            }
        }
        None => prompt.push_str("Job: general talent pool profile, no criteria\n"),
    }
    if request.degraded {
        prompt.push_str("Note: the résumé text could not be extracted.\n");
    }
    prompt.push_str("\nRésumé:\n");
    prompt.push_str(&request.text);
    prompt
}

/// OpenAI-compatible chat-completions client using JSON response mode.
pub struct OpenAiAnalyst {
    client: reqwest::Client,
    config: AnalystConfig,
}

impl OpenAiAnalyst {
    pub fn new(config: AnalystConfig) -> Result<Self, AnalystError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AnalystError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CandidateAnalyst for OpenAiAnalyst {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalystResponse, AnalystError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AnalystError::NotConfigured("OPENAI_API_KEY is not set".to_string()))?;

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(request),
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(
            application_id = %request.application_id,
            model = %self.config.model,
            "requesting AI assessment"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalystError::Timeout
                } else {
                    AnalystError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalystError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                AnalystError::Upstream {
                    status: status.as_u16(),
                    message,
                }
            } else {
                AnalystError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AnalystError::Transport(err.to_string()))?;

        let raw = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|usage| TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
            .unwrap_or_default();

        Ok(AnalystResponse { raw, usage })
    }
}
