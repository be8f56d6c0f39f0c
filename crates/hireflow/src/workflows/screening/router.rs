use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationId, ApplicationSubmission, Criterion, JobContext, JobId};
use super::notify::Notifier;
use super::pipeline::{AnalysisPipeline, PipelineError};
use super::repository::{ApplicationRepository, RepositoryError};

/// Router builder exposing intake and operator endpoints.
pub fn application_router<R, N>(pipeline: Arc<AnalysisPipeline<R, N>>) -> Router
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(submit_handler::<R, N>))
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/requeue",
            post(requeue_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/reject",
            post(reject_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/clone",
            post(clone_handler::<R, N>),
        )
        .route("/api/v1/jobs/:job_id", put(upsert_job_handler::<R, N>))
        .route(
            "/api/v1/jobs/:job_id/requeue",
            post(requeue_job_handler::<R, N>),
        )
        .route(
            "/api/v1/jobs/:job_id/ranking",
            get(ranking_handler::<R, N>),
        )
        .with_state(pipeline)
}

impl PipelineError {
    /// HTTP status for the failure, shared by the routes and [`crate::error::AppError`].
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::NotFound(_)
            | PipelineError::UnknownJob(_)
            | PipelineError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            PipelineError::Submission(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::InvalidState { .. }
            | PipelineError::Repository(
                RepositoryError::Conflict
                | RepositoryError::StatusChanged { .. }
                | RepositoryError::InvalidTransition { .. }
                | RepositoryError::InvalidCombination { .. },
            ) => StatusCode::CONFLICT,
            PipelineError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn error_response(error: PipelineError) -> Response {
    let status = error.status_code();
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    axum::Json(submission): axum::Json<ApplicationSubmission>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    match pipeline.submit(submission) {
        Ok(record) => {
            let view = record.status_view(pipeline.engine().config().weights);
            (StatusCode::ACCEPTED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    match pipeline.get(&ApplicationId(application_id)) {
        Ok(record) => {
            let view = record.status_view(pipeline.engine().config().weights);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn requeue_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    match pipeline.requeue(&ApplicationId(application_id)) {
        Ok(record) => {
            let view = record.status_view(pipeline.engine().config().weights);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RejectRequest {
    #[serde(default)]
    feedback: String,
}

pub(crate) async fn reject_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    match pipeline.reject_with_feedback(&ApplicationId(application_id), &request.feedback) {
        Ok(record) => {
            let view = record.status_view(pipeline.engine().config().weights);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CloneRequest {
    #[serde(default)]
    job_id: Option<JobId>,
}

pub(crate) async fn clone_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<CloneRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    match pipeline.clone_to_job(&ApplicationId(application_id), request.job_id.as_ref()) {
        Ok(record) => {
            let view = record.status_view(pipeline.engine().config().weights);
            (StatusCode::CREATED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    criteria: Vec<Criterion>,
}

pub(crate) async fn upsert_job_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(job_id): Path<String>,
    axum::Json(request): axum::Json<JobRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    let job = JobContext {
        job_id: JobId(job_id),
        title: request.title,
        description: request.description,
        criteria: request.criteria,
    };

    match pipeline.jobs().upsert(job) {
        Ok(job) => (StatusCode::OK, axum::Json(job)).into_response(),
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn requeue_job_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(job_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    let job_id = JobId(job_id);
    match pipeline.requeue_job(&job_id) {
        Ok(requeued) => {
            let payload = json!({
                "job_id": job_id,
                "requeued": requeued,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn ranking_handler<R, N>(
    State(pipeline): State<Arc<AnalysisPipeline<R, N>>>,
    Path(job_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: Notifier + 'static,
{
    let job_id = JobId(job_id);
    match pipeline.ranking(&job_id) {
        Ok(candidates) => {
            let payload = json!({
                "job_id": job_id,
                "candidates": candidates,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
