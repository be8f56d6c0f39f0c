//! Reconciles both payload schemas into one weighted score used for ranking.

use serde::Serialize;

use super::super::domain::{AiStatus, ApplicationId};
use super::super::repository::ApplicationRecord;
use super::config::ScoreWeights;
use super::payload::{EvaluationPayload, LegacyAssessment};

const PERFORMANCE_SHARE: f64 = 0.1;
const SOFT_SKILL_CEILING: f64 = 60.0;
const SOFT_SKILL_SATURATION: f64 = 5.0;
const LEADERSHIP_BONUS: f64 = 40.0;

/// Weighted score of a record. Anything not `DONE` weighs zero.
pub fn weighted_score(
    status: AiStatus,
    payload: Option<&EvaluationPayload>,
    raw_score: Option<u8>,
    weights: ScoreWeights,
) -> u32 {
    if status != AiStatus::Done {
        return 0;
    }

    let tech_share = f64::from(weights.tech) / 100.0;
    let culture_share = f64::from(weights.culture) / 100.0;

    let total = match payload {
        Some(EvaluationPayload::V1_2(assessment)) => {
            let scores = &assessment.base_scores;
            scores.technical * tech_share
                + scores.cultural * culture_share
                + scores.performance * PERFORMANCE_SHARE
        }
        Some(EvaluationPayload::Legacy(assessment)) => {
            let technical = raw_score
                .map(f64::from)
                .or(assessment.score)
                .unwrap_or(0.0);
            technical * tech_share + legacy_culture_proxy(Some(assessment)) * culture_share
        }
        None => raw_score.map(f64::from).unwrap_or(0.0) * tech_share,
    };

    if total.is_finite() && total > 0.0 {
        total.round() as u32
    } else {
        0
    }
}

/// Culture stand-in for payloads without a cultural dimension: detected soft skills
/// saturate at five, plus a bonus when a leadership style was identified.
pub(crate) fn legacy_culture_proxy(assessment: Option<&LegacyAssessment>) -> f64 {
    let Some(assessment) = assessment else {
        return 0.0;
    };

    let signals = assessment.soft_skill_count() as f64;
    let soft = (signals / SOFT_SKILL_SATURATION * SOFT_SKILL_CEILING).min(SOFT_SKILL_CEILING);
    let leadership = if assessment.leadership_style().is_some() {
        LEADERSHIP_BONUS
    } else {
        0.0
    };

    soft + leadership
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCandidate {
    pub application_id: ApplicationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    pub weighted_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

/// Orders scored records by weighted score, earliest submission first on ties.
pub fn rank(records: &[ApplicationRecord], weights: ScoreWeights) -> Vec<RankedCandidate> {
    let mut scored: Vec<(&ApplicationRecord, u32)> = records
        .iter()
        .filter(|record| record.ai_status == AiStatus::Done)
        .map(|record| (record, record.weighted_score(weights)))
        .collect();

    scored.sort_by(|(left, left_score), (right, right_score)| {
        right_score
            .cmp(left_score)
            .then_with(|| left.created_at.cmp(&right.created_at))
    });

    scored
        .into_iter()
        .map(|(record, weighted_score)| RankedCandidate {
            application_id: record.id.clone(),
            candidate_name: record.candidate_name.clone(),
            weighted_score,
            score: record.trusted_score(),
        })
        .collect()
}
