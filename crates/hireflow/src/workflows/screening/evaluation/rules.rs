use std::collections::BTreeMap;

use super::super::domain::Criterion;
use super::payload::Verdict;
use super::CriterionResult;

pub(crate) struct CriteriaTally {
    pub results: Vec<CriterionResult>,
    pub raw_total: f64,
    pub failed_eliminatory: Vec<String>,
}

impl CriteriaTally {
    pub fn satisfied_labels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| result.satisfied)
            .map(|result| result.label.as_str())
            .collect()
    }
}

/// The explicit flag wins; otherwise any configured keyword inside the label makes the
/// criterion eliminatory.
pub(crate) fn is_eliminatory(criterion: &Criterion, keywords: &[String]) -> bool {
    if let Some(flag) = criterion.eliminatory {
        return flag;
    }

    let label = criterion.label.to_lowercase();
    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .any(|keyword| !keyword.is_empty() && label.contains(&keyword))
}

fn find_verdict<'a>(verdicts: &'a BTreeMap<String, Verdict>, label: &str) -> Option<&'a Verdict> {
    if let Some(verdict) = verdicts.get(label) {
        return Some(verdict);
    }

    let wanted = label.trim().to_lowercase();
    verdicts
        .iter()
        .find(|(key, _)| key.trim().to_lowercase() == wanted)
        .map(|(_, verdict)| verdict)
}

/// Every criterion weighs `100 / N`. Unreadable text leaves every criterion unsatisfied.
pub(crate) fn tally_criteria(
    criteria: &[Criterion],
    verdicts: &BTreeMap<String, Verdict>,
    readable: bool,
    keywords: &[String],
) -> CriteriaTally {
    let share = if criteria.is_empty() {
        0.0
    } else {
        100.0 / criteria.len() as f64
    };

    let mut results = Vec::with_capacity(criteria.len());
    let mut raw_total = 0.0;
    let mut failed_eliminatory = Vec::new();

    for criterion in criteria {
        let eliminatory = is_eliminatory(criterion, keywords);
        let verdict = if readable {
            find_verdict(verdicts, &criterion.label)
        } else {
            None
        };
        let satisfied = verdict.map(|verdict| verdict.satisfied).unwrap_or(false);
        let contribution = if satisfied { share } else { 0.0 };

        raw_total += contribution;
        if eliminatory && !satisfied {
            failed_eliminatory.push(criterion.label.clone());
        }

        results.push(CriterionResult {
            label: criterion.label.clone(),
            eliminatory,
            satisfied,
            contribution,
            evidence: verdict.and_then(|verdict| verdict.evidence.clone()),
        });
    }

    CriteriaTally {
        results,
        raw_total,
        failed_eliminatory,
    }
}

pub(crate) fn clamp_score(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Talent-pool match between the technical and cultural dimensions.
pub(crate) fn global_match(technical: f64, cultural: f64, culture_weight: f64) -> u8 {
    let culture_weight = if culture_weight.is_finite() {
        culture_weight.clamp(0.15, 0.85)
    } else {
        0.5
    };
    clamp_score(technical * (1.0 - culture_weight) + cultural * culture_weight)
}
