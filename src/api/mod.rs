/// HTTP API Layer
///
/// REST endpoints over the workflow service. Every route except the health
/// check is tenant scoped through the `X-User-ID` header; entities owned by
/// another tenant are reported as not found.

// Workflow submission, listing and progress endpoints
pub mod workflows;

// Job lookup and cancellation endpoints
pub mod jobs;

use crate::{error::SchedulerError, service::WorkflowService};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;
use std::sync::Arc;

pub use jobs::create_job_routes;
pub use workflows::create_workflow_routes;

/// Header carrying the caller's tenant id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

/// All tenant-scoped routes with state attached
pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .merge(create_workflow_routes())
        .merge(create_job_routes())
        .with_state(state)
}

/// Caller identity taken from the `X-User-ID` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| TenantId(value.to_string()))
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Missing X-User-ID header"))
    }
}

/// Error response rendered as `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        let status = match &error {
            SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
            SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::InvalidState { .. } => StatusCode::CONFLICT,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
