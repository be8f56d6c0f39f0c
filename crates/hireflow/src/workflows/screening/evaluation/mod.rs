mod config;
mod payload;
mod policy;
mod rules;
mod weighting;

pub use config::{ScoreWeights, ScoringConfig};
pub use payload::{
    BaseScores, EvaluationPayload, LeadershipEvaluation, LegacyAssessment, LegacyProfile,
    PayloadError, SoftSkillsAnalysis, Verdict, VersionedAssessment, CURRENT_SCHEMA_VERSION,
};
pub use policy::EvaluationDecision;
pub use weighting::{rank, weighted_score, RankedCandidate};

use serde::{Deserialize, Serialize};

use super::domain::Criterion;
use super::extraction::ExtractedText;
use policy::{decide, explain};

/// Pure scoring engine: criteria verdicts plus rubric configuration in, score and decision out.
#[derive(Debug, Clone)]
pub struct EvaluationEngine {
    config: ScoringConfig,
}

impl EvaluationEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        text: &ExtractedText,
        criteria: &[Criterion],
        payload: EvaluationPayload,
    ) -> EvaluationOutcome {
        let tally = rules::tally_criteria(
            criteria,
            payload.criteria_verdicts(),
            !text.degraded,
            &self.config.eliminatory_keywords,
        );
        let decision = decide(&tally, !criteria.is_empty());

        let score = match &decision {
            EvaluationDecision::Disqualified { .. } => 0,
            EvaluationDecision::Qualified { .. } => rules::clamp_score(tally.raw_total),
            EvaluationDecision::PoolProfile => self.pool_score(&payload),
        };

        let explanation = explain(&decision, &tally, &payload, score, text.degraded);

        EvaluationOutcome {
            score,
            explanation,
            report: EvaluationReport {
                disqualified: matches!(decision, EvaluationDecision::Disqualified { .. }),
                degraded: text.degraded,
                criteria: tally.results,
                payload,
            },
            decision,
        }
    }

    fn pool_score(&self, payload: &EvaluationPayload) -> u8 {
        match payload {
            EvaluationPayload::V1_2(assessment) => rules::global_match(
                assessment.base_scores.technical,
                assessment.base_scores.cultural,
                self.config.culture_match_weight,
            ),
            EvaluationPayload::Legacy(assessment) => {
                assessment.score.map(rules::clamp_score).unwrap_or(0)
            }
        }
    }
}

/// Per-criterion audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub label: String,
    pub eliminatory: bool,
    pub satisfied: bool,
    pub contribution: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Structured evaluation persisted on the application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub payload: EvaluationPayload,
    #[serde(default)]
    pub criteria: Vec<CriterionResult>,
    #[serde(default)]
    pub disqualified: bool,
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub score: u8,
    pub decision: EvaluationDecision,
    pub explanation: String,
    pub report: EvaluationReport,
}

impl EvaluationOutcome {
    pub fn disqualified(&self) -> bool {
        self.report.disqualified
    }
}
