/// Job REST API endpoints

use crate::{
    api::{ApiError, AppState, TenantId},
    workflow::types::{Job, JobId},
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};

pub fn create_job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

/// GET /jobs/{id}
async fn get_job(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.service.get_job(&JobId::from(id.as_str()), &user_id).await?;
    Ok(Json(job))
}

/// POST /jobs/{id}/cancel
///
/// Only PENDING jobs can be cancelled; anything else answers 409.
async fn cancel_job(
    State(state): State<AppState>,
    TenantId(user_id): TenantId,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.service.cancel_job(&JobId::from(id.as_str()), &user_id).await?;
    tracing::info!("🛑 Cancelled job {} for user {}", job.job_id, user_id);
    Ok(Json(job))
}
