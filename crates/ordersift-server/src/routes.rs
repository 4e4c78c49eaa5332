//! HTTP job-control surface.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use ordersift::{Job, JobError, JobRunner};

const HEALTHZ_PATH: &str = "/healthz";
const START_SUPPLIERS_PATH: &str = "/jobs/start";
const START_AMAZON_PATH: &str = "/jobs/start-amazon";
const JOB_STATUS_PATH: &str = "/jobs/status";
const JOB_PATH: &str = "/jobs/{job_id}";
const USER_HEADER: &str = "x-user-id";

/// Number of recent log lines returned by the status endpoint.
const STATUS_LOG_LINES: usize = 20;

pub struct AppState {
    pub runner: Arc<JobRunner>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    job_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    supplier_domains: Option<Vec<String>>,
    job_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    job_id: String,
}

struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": { "code": code, "message": message.into() } }),
        }
    }

    fn missing_user() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "missing_user",
            format!("{USER_HEADER} header is required"),
        )
    }
}

impl From<JobError> for ApiError {
    fn from(error: JobError) -> Self {
        match error {
            JobError::NotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no job with id {id}"),
            ),
            JobError::NotOwned { job_id, .. } => Self::new(
                StatusCode::FORBIDDEN,
                "not_owned",
                format!("job {job_id} belongs to another user"),
            ),
            other => {
                tracing::error!("job request failed: {}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "internal error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(START_SUPPLIERS_PATH, post(start_suppliers))
        .route(START_AMAZON_PATH, post(start_amazon))
        .route(JOB_STATUS_PATH, get(job_status))
        .route(JOB_PATH, get(get_job))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(ApiError::missing_user)
}

async fn start_suppliers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<StartRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_id(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let job = match request.job_type.as_deref() {
        Some("amazon") => state.runner.start_amazon(&user),
        _ => state.runner.start_suppliers(&user, request.supplier_domains),
    };
    Ok(accepted(job))
}

async fn start_amazon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_id(&headers)?;
    let job = state.runner.start_amazon(&user);
    Ok(accepted(job))
}

fn accepted(job: Job) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(StartResponse { job_id: job.id }),
    )
}

/// Polling view: a missing job answers `hasJob: false` rather than 404 so
/// clients can poll a remembered id after a server restart without special
/// casing.
async fn job_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_id(&headers)?;
    let job = match state.runner.manager().get_job_for_user(&query.job_id, &user) {
        Ok(job) => job,
        Err(JobError::NotFound(_)) => return Ok(Json(json!({ "hasJob": false }))),
        Err(other) => return Err(other.into()),
    };
    let logs: Vec<_> = job.logs.iter().take(STATUS_LOG_LINES).collect();
    Ok(Json(json!({
        "hasJob": true,
        "jobId": job.id,
        "status": job.status,
        "progress": job.progress,
        "currentEmail": job.current_email,
        "orders": job.orders,
        "logs": logs,
        "error": job.error,
    })))
}

/// Full job view including consolidated orders and recent logs.
async fn get_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_id(&headers)?;
    let job = state.runner.manager().get_job_for_user(&job_id, &user)?;
    Ok(Json(job))
}
