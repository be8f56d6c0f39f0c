use serde::{Deserialize, Serialize};

/// Percentage split between the technical and cultural dimensions used for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub tech: u8,
    pub culture: u8,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tech: 70,
            culture: 30,
        }
    }
}

/// Rubric configuration injected into the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Lowercase substrings that mark a criterion label as eliminatory.
    pub eliminatory_keywords: Vec<String>,
    pub weights: ScoreWeights,
    /// Culture share of the talent-pool match score, clamped to `[0.15, 0.85]` when applied.
    pub culture_match_weight: f64,
    /// Folded into deduplication keys; bump it when the prompt or rubric changes.
    pub revision: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            eliminatory_keywords: [
                "obrigatório",
                "obrigatorio",
                "eliminatório",
                "eliminatorio",
                "mandatory",
                "required",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            weights: ScoreWeights::default(),
            culture_match_weight: 0.5,
            revision: "2.3".to_string(),
        }
    }
}
