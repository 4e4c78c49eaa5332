use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use async_trait::async_trait;
use ordersift::catalog::{CatalogClient, CatalogItem};
use ordersift::error::{CatalogError, ExtractError, MailboxError};
use ordersift::mailbox::MailMessage;
use ordersift::{
    GenerativeClient, JobManager, JobRunner, JobType, MailboxClient, PipelineConfig,
};
use ordersift_server::{build_router, AppState};

struct EmptyMailbox;

#[async_trait]
impl MailboxClient for EmptyMailbox {
    async fn list_message_ids(&self, _query: &str, _max: usize) -> Result<Vec<String>, MailboxError> {
        Ok(Vec::new())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        Err(MailboxError::MessageNotFound(id.to_string()))
    }

    async fn get_attachment(
        &self,
        _message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        Err(MailboxError::MessageNotFound(attachment_id.to_string()))
    }
}

struct NullGenerative;

#[async_trait]
impl GenerativeClient for NullGenerative {
    async fn generate(&self, _prompt: &str) -> Result<String, ExtractError> {
        Err(ExtractError::Transport("unused".to_string()))
    }
}

struct NullCatalog;

#[async_trait]
impl CatalogClient for NullCatalog {
    async fn lookup_items(&self, _asins: &[String]) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(Vec::new())
    }
}

fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        runner: Arc::new(JobRunner::new(
            Arc::new(JobManager::new()),
            Arc::new(EmptyMailbox),
            Arc::new(NullGenerative),
            Arc::new(NullCatalog),
            PipelineConfig::default(),
        )),
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_ok() {
    let router = build_router(test_state());
    let response = router
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn start_job_returns_accepted_with_id() {
    let router = build_router(test_state());
    let response = router
        .oneshot(
            Request::post("/jobs/start")
                .header("x-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["jobId"].as_str().unwrap().len() > 10);
}

#[tokio::test]
async fn start_job_without_user_is_rejected() {
    let router = build_router(test_state());
    let response = router
        .oneshot(Request::post("/jobs/start").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_reports_created_job() {
    let state = test_state();
    let job = state.runner.manager().create_job("user-1", JobType::Suppliers);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::get(format!("/jobs/status?jobId={}", job.id))
                .header("x-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["hasJob"], true);
    assert_eq!(body["jobId"], job.id.as_str());
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn status_of_unknown_job_reports_absence() {
    let router = build_router(test_state());
    let response = router
        .oneshot(
            Request::get("/jobs/status?jobId=gone")
                .header("x-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["hasJob"], false);
    assert!(body.get("jobId").is_none());
}

#[tokio::test]
async fn start_body_can_select_amazon_pipeline() {
    let state = test_state();
    let router = build_router(state.clone());
    let response = router
        .oneshot(
            Request::post("/jobs/start")
                .header("x-user-id", "user-1")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"jobType":"amazon"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let job = state
        .runner
        .manager()
        .get_job(body["jobId"].as_str().unwrap())
        .unwrap();
    assert_eq!(job.job_type, JobType::Amazon);
}

#[tokio::test]
async fn job_of_another_user_is_forbidden() {
    let state = test_state();
    let job = state.runner.manager().create_job("user-1", JobType::Suppliers);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::get(format!("/jobs/{}", job.id))
                .header("x-user-id", "user-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let router = build_router(test_state());
    let response = router
        .oneshot(
            Request::get("/jobs/does-not-exist")
                .header("x-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
