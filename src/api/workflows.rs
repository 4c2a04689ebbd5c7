/// Workflow REST API endpoints
///
/// Submission of job bundles plus tenant-scoped listing, detail, job list and
/// aggregate progress views.

use crate::{
    api::{ApiError, AppState, TenantId},
    workflow::types::{Job, JobSpec, JobType, WorkflowId, WorkflowProgress, WorkflowView},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

/// Request body for workflow creation
///
/// Fields are optional so a missing one is reported with its position
/// instead of a generic deserialization failure.
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    #[serde(default)]
    pub jobs: Vec<NewJobRequest>,
}

#[derive(Debug, Deserialize)]
pub struct NewJobRequest {
    pub branch: Option<String>,
    pub job_type: Option<JobType>,
    pub wsi_path: Option<String>,
}

impl CreateWorkflowRequest {
    /// Convert into job specs; empty strings are left for store validation
    pub fn into_specs(self) -> Result<Vec<JobSpec>, ApiError> {
        self.jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| {
                let job_type = job
                    .job_type
                    .ok_or_else(|| ApiError::bad_request(format!("jobs[{index}].job_type is required")))?;
                Ok(JobSpec::new(
                    job.branch.unwrap_or_default(),
                    job_type,
                    job.wsi_path.unwrap_or_default(),
                ))
            })
            .collect()
    }
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/jobs", get(get_workflow_jobs))
        .route("/workflows/{id}/progress", get(get_workflow_progress))
}

/// POST /workflows
/// Body: { "jobs": [{ "branch": "...", "job_type": "CELL_SEGMENTATION", "wsi_path": "..." }] }
async fn create_workflow(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
    payload: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> Result<Json<WorkflowView>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let specs = request.into_specs()?;

    let view = state.service.submit_workflow(&user_id, specs).await?;
    tracing::info!(
        "🔥 Created workflow {} for user {} ({} jobs)",
        view.workflow_id,
        user_id,
        view.jobs.len()
    );
    Ok(Json(view))
}

/// GET /workflows
async fn list_workflows(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
) -> Json<Vec<WorkflowView>> {
    Json(state.service.list_workflows(&user_id).await)
}

/// GET /workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
    Path(id): Path<String>,
) -> Result<Json<WorkflowView>, ApiError> {
    let view = state
        .service
        .get_workflow(&WorkflowId::from(id.as_str()), &user_id)
        .await?;
    Ok(Json(view))
}

/// GET /workflows/{id}/jobs
async fn get_workflow_jobs(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
    Path(id): Path<String>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let view = state
        .service
        .get_workflow(&WorkflowId::from(id.as_str()), &user_id)
        .await?;
    Ok(Json(view.jobs))
}

/// GET /workflows/{id}/progress
async fn get_workflow_progress(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
    Path(id): Path<String>,
) -> Result<Json<WorkflowProgress>, ApiError> {
    let progress = state
        .service
        .get_workflow_progress(&WorkflowId::from(id.as_str()), &user_id)
        .await?;
    Ok(Json(progress))
}
