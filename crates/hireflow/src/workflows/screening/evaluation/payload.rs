//! Validation of AI collaborator output into one of the two supported payload shapes.
//!
//! The current schema carries `"schema_version": "1.2"` and explicit dimension scores.
//! Anything without that marker is read as the legacy shape, which only exposes a raw score,
//! detected soft skills, and a leadership style.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const CURRENT_SCHEMA_VERSION: &str = "1.2";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("empty AI response")]
    Empty,
    #[error("malformed AI response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("AI response does not match the evaluation schema: {0}")]
    Schema(String),
}

/// Tagged union over the evaluation payload versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvaluationPayload {
    V1_2(VersionedAssessment),
    Legacy(LegacyAssessment),
}

impl EvaluationPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PayloadError::Empty);
        }
        let value: Value = serde_json::from_str(trimmed)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let Some(object) = value.as_object() else {
            return Err(PayloadError::Schema("expected a JSON object".to_string()));
        };
        if object.is_empty() {
            return Err(PayloadError::Empty);
        }

        let versioned = object
            .get("schema_version")
            .and_then(Value::as_str)
            .map(|version| version.trim() == CURRENT_SCHEMA_VERSION)
            .unwrap_or(false);

        if versioned {
            let assessment: VersionedAssessment = serde_json::from_value(value)
                .map_err(|err| PayloadError::Schema(err.to_string()))?;
            assessment.base_scores.validate()?;
            Ok(EvaluationPayload::V1_2(assessment))
        } else {
            let assessment: LegacyAssessment = serde_json::from_value(value)
                .map_err(|err| PayloadError::Schema(err.to_string()))?;
            if let Some(score) = assessment.score {
                check_range("score", score)?;
            }
            Ok(EvaluationPayload::Legacy(assessment))
        }
    }

    pub fn version_label(&self) -> &str {
        match self {
            EvaluationPayload::V1_2(_) => CURRENT_SCHEMA_VERSION,
            EvaluationPayload::Legacy(assessment) => {
                assessment.schema_version.as_deref().unwrap_or("legacy")
            }
        }
    }

    pub fn criteria_verdicts(&self) -> &BTreeMap<String, Verdict> {
        match self {
            EvaluationPayload::V1_2(assessment) => &assessment.criteria_evaluation,
            EvaluationPayload::Legacy(assessment) => &assessment.criteria_evaluation,
        }
    }

    pub fn rationale(&self) -> Option<&str> {
        let text = match self {
            EvaluationPayload::V1_2(assessment) => assessment.consolidated_rationale.as_str(),
            EvaluationPayload::Legacy(assessment) => {
                assessment.explanation.as_deref().unwrap_or_default()
            }
        };
        let text = text.trim();
        (!text.is_empty()).then_some(text)
    }

    pub fn candidate_name(&self) -> Option<&str> {
        let name = match self {
            EvaluationPayload::V1_2(assessment) => assessment.candidate_name.as_deref(),
            EvaluationPayload::Legacy(assessment) => assessment.candidate_name.as_deref(),
        }?;
        let name = name.trim();
        (!name.is_empty() && !name.eq_ignore_ascii_case("candidato não identificado"))
            .then_some(name)
    }

    pub fn candidate_email(&self) -> Option<&str> {
        let email = match self {
            EvaluationPayload::V1_2(assessment) => assessment.candidate_email.as_deref(),
            EvaluationPayload::Legacy(assessment) => assessment.candidate_email.as_deref(),
        }?;
        let email = email.trim();
        email.contains('@').then_some(email)
    }

    /// The collaborator may flag documents that are not résumés at all (contracts, invoices).
    pub fn declares_non_resume(&self) -> bool {
        let flag = match self {
            EvaluationPayload::V1_2(assessment) => assessment.is_resume,
            EvaluationPayload::Legacy(assessment) => assessment.is_resume,
        };
        flag == Some(false)
    }
}

impl<'de> Deserialize<'de> for EvaluationPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        EvaluationPayload::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Schema 1.2 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedAssessment {
    pub schema_version: String,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub candidate_email: Option<String>,
    #[serde(default)]
    pub is_resume: Option<bool>,
    #[serde(default)]
    pub top_skills: Vec<String>,
    #[serde(default)]
    pub professional_summary: String,
    #[serde(default)]
    pub estimated_seniority: Option<String>,
    #[serde(default)]
    pub base_scores: BaseScores,
    #[serde(default)]
    pub real_gaps: Vec<String>,
    #[serde(default)]
    pub criteria_evaluation: BTreeMap<String, Verdict>,
    #[serde(default)]
    pub consolidated_rationale: String,
}

/// Dimension scores reported by schema 1.2. Missing dimensions default to the neutral 50.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseScores {
    #[serde(alias = "tecnica", default = "neutral_score")]
    pub technical: f64,
    #[serde(alias = "cultura", default = "neutral_score")]
    pub cultural: f64,
    #[serde(default = "neutral_score")]
    pub performance: f64,
    #[serde(alias = "maturidade", default = "neutral_score")]
    pub maturity: f64,
}

fn neutral_score() -> f64 {
    50.0
}

impl Default for BaseScores {
    fn default() -> Self {
        Self {
            technical: neutral_score(),
            cultural: neutral_score(),
            performance: neutral_score(),
            maturity: neutral_score(),
        }
    }
}

impl BaseScores {
    fn validate(&self) -> Result<(), PayloadError> {
        check_range("base_scores.technical", self.technical)?;
        check_range("base_scores.cultural", self.cultural)?;
        check_range("base_scores.performance", self.performance)?;
        check_range("base_scores.maturity", self.maturity)
    }
}

fn check_range(field: &str, value: f64) -> Result<(), PayloadError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(PayloadError::Schema(format!(
            "{field} must be between 0 and 100 (found {value})"
        )))
    }
}

/// Pre-1.2 output with no version marker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub candidate_email: Option<String>,
    #[serde(default)]
    pub is_resume: Option<bool>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub soft_skills_analysis: Option<SoftSkillsAnalysis>,
    #[serde(default)]
    pub profile: Option<LegacyProfile>,
    #[serde(default)]
    pub leadership_evaluation: Option<LeadershipEvaluation>,
    #[serde(default)]
    pub criteria_evaluation: BTreeMap<String, Verdict>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl LegacyAssessment {
    pub fn soft_skill_count(&self) -> usize {
        self.soft_skills_analysis
            .as_ref()
            .map(|analysis| analysis.detected.len())
            .unwrap_or(0)
    }

    /// Leadership style from either legacy location; `None` and blanks are ignored.
    pub fn leadership_style(&self) -> Option<&str> {
        let from_profile = self
            .profile
            .as_ref()
            .and_then(|profile| profile.leadership_style.as_deref());
        let from_evaluation = self
            .leadership_evaluation
            .as_ref()
            .and_then(|evaluation| evaluation.style_detected.as_deref());

        from_profile
            .into_iter()
            .chain(from_evaluation)
            .map(str::trim)
            .find(|style| !style.is_empty() && !style.eq_ignore_ascii_case("none"))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SoftSkillsAnalysis {
    #[serde(default)]
    pub detected: Vec<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyProfile {
    #[serde(default)]
    pub leadership_style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeadershipEvaluation {
    #[serde(default)]
    pub style_detected: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Per-criterion verdict from the collaborator. Accepts booleans, the `ADERE` / `NÃO ADERE`
/// labels, or an object with `satisfied` and optional `evidence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub satisfied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Verdict {
    pub fn met() -> Self {
        Self {
            satisfied: true,
            evidence: None,
        }
    }

    pub fn unmet() -> Self {
        Self {
            satisfied: false,
            evidence: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVerdict {
    Flag(bool),
    Label(String),
    Detailed {
        satisfied: bool,
        #[serde(default)]
        evidence: Option<String>,
    },
}

fn parse_verdict_label(label: &str) -> Option<bool> {
    let normalized = label.trim().to_lowercase();
    match normalized.as_str() {
        "adere" | "atende" | "sim" | "yes" | "true" | "met" | "match" | "satisfied" => Some(true),
        "não adere" | "nao adere" | "não atende" | "nao atende" | "não" | "nao" | "no"
        | "false" | "not met" | "missing" | "unsatisfied" => Some(false),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawVerdict::deserialize(deserializer)? {
            RawVerdict::Flag(satisfied) => Ok(Verdict {
                satisfied,
                evidence: None,
            }),
            RawVerdict::Label(label) => parse_verdict_label(&label)
                .map(|satisfied| Verdict {
                    satisfied,
                    evidence: None,
                })
                .ok_or_else(|| {
                    serde::de::Error::custom(format!("unrecognized criterion verdict '{label}'"))
                }),
            RawVerdict::Detailed {
                satisfied,
                evidence,
            } => Ok(Verdict {
                satisfied,
                evidence,
            }),
        }
    }
}
