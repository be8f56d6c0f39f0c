use clap::Args;
use hireflow::config::AppConfig;
use hireflow::error::AppError;
use hireflow::workflows::screening::{
    prepare_text, weighted_score, AiStatus, Criterion, CriterionResult, EvaluationEngine,
    EvaluationPayload, ScoringConfig,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Plain-text résumé file
    #[arg(long)]
    pub(crate) resume: PathBuf,
    /// JSON assessment previously returned by the AI service (schema 1.2 or legacy)
    #[arg(long)]
    pub(crate) assessment: PathBuf,
    /// Job criterion; keywords such as "obrigatório" or "mandatory" make it eliminatory
    #[arg(long)]
    pub(crate) criterion: Vec<String>,
    /// Criterion that is always eliminatory
    #[arg(long)]
    pub(crate) eliminatory: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreSummary {
    pub(crate) schema_version: String,
    pub(crate) score: u8,
    pub(crate) weighted_score: u32,
    pub(crate) decision: String,
    pub(crate) disqualified: bool,
    pub(crate) degraded: bool,
    pub(crate) explanation: String,
    pub(crate) criteria: Vec<CriterionResult>,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let resume = std::fs::read_to_string(&args.resume)?;
    let assessment = std::fs::read_to_string(&args.assessment)?;

    let criteria = criteria_from(args.criterion, args.eliminatory);
    let summary = score_assessment(
        config.scoring,
        config.pipeline.min_text_chars,
        &resume,
        &assessment,
        &criteria,
    )?;

    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|err| AppError::Input(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn criteria_from(plain: Vec<String>, eliminatory: Vec<String>) -> Vec<Criterion> {
    plain
        .into_iter()
        .map(Criterion::new)
        .chain(eliminatory.into_iter().map(Criterion::eliminatory))
        .collect()
}

pub(crate) fn score_assessment(
    scoring: ScoringConfig,
    min_text_chars: usize,
    resume: &str,
    assessment: &str,
    criteria: &[Criterion],
) -> Result<ScoreSummary, AppError> {
    let payload = EvaluationPayload::parse(assessment)
        .map_err(|err| AppError::Input(format!("assessment: {err}")))?;
    let schema_version = payload.version_label().to_string();
    let weights = scoring.weights;
    let engine = EvaluationEngine::new(scoring);
    let text = prepare_text(Ok(resume.to_string()), min_text_chars);

    let outcome = engine.evaluate(&text, criteria, payload);
    let status = if outcome.disqualified() {
        AiStatus::Rejected
    } else {
        AiStatus::Done
    };
    let weighted = weighted_score(
        status,
        Some(&outcome.report.payload),
        Some(outcome.score),
        weights,
    );

    Ok(ScoreSummary {
        schema_version,
        score: outcome.score,
        weighted_score: weighted,
        decision: outcome.decision.summary(),
        disqualified: outcome.disqualified(),
        degraded: outcome.report.degraded,
        explanation: outcome.explanation,
        criteria: outcome.report.criteria,
    })
}
