use serde::{Deserialize, Serialize};

use super::payload::EvaluationPayload;
use super::rules::CriteriaTally;

/// Disposition reached by the scoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationDecision {
    Qualified { satisfied: usize, total: usize },
    Disqualified { failed: Vec<String> },
    PoolProfile,
}

impl EvaluationDecision {
    pub fn summary(&self) -> String {
        match self {
            EvaluationDecision::Qualified { satisfied, total } => {
                format!("satisfied {satisfied} of {total} criteria")
            }
            EvaluationDecision::Disqualified { failed } => {
                format!("disqualified: {}", failed.join(", "))
            }
            EvaluationDecision::PoolProfile => "talent pool profile".to_string(),
        }
    }
}

pub(crate) fn decide(tally: &CriteriaTally, has_criteria: bool) -> EvaluationDecision {
    if !has_criteria {
        return EvaluationDecision::PoolProfile;
    }

    if !tally.failed_eliminatory.is_empty() {
        return EvaluationDecision::Disqualified {
            failed: tally.failed_eliminatory.clone(),
        };
    }

    EvaluationDecision::Qualified {
        satisfied: tally.satisfied_labels().len(),
        total: tally.results.len(),
    }
}

pub(crate) fn explain(
    decision: &EvaluationDecision,
    tally: &CriteriaTally,
    payload: &EvaluationPayload,
    score: u8,
    degraded: bool,
) -> String {
    let mut explanation = match decision {
        EvaluationDecision::Disqualified { failed } => format!(
            "Automatically rejected: the candidate does not meet mandatory criteria for this job ({}).",
            failed.join(", ")
        ),
        EvaluationDecision::Qualified { satisfied, total } => {
            let labels = tally.satisfied_labels();
            if labels.is_empty() {
                format!("Satisfied {satisfied} of {total} criteria.")
            } else {
                format!(
                    "Satisfied {satisfied} of {total} criteria: {}.",
                    labels.join(", ")
                )
            }
        }
        EvaluationDecision::PoolProfile => match payload.rationale() {
            Some(rationale) => rationale.to_string(),
            None => format!("Talent pool match score {score}/100."),
        },
    };

    if degraded {
        explanation.push_str(" The résumé text could not be read, so no criterion was verified.");
    }

    explanation
}
