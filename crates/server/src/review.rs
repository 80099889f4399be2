//! Review-queue API routes: everything staff do with pending drafts.
//!
//! Endpoints (mounted under `/api/v1`):
//! - `GET  /drafts`                    — pending drafts, oldest first, with dossiers
//! - `POST /drafts/compose`            — draft from a natural-language instruction
//! - `POST /drafts/queue`              — queue staff-written text verbatim
//! - `POST /drafts/escalate`           — queue a question for the owner
//! - `POST /drafts/{id}/send`          — send, optionally with edited text
//! - `POST /drafts/{id}/dismiss`       — drop without sending
//! - `POST /drafts/{id}/regenerate`    — redraft against reviewer feedback

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use barkline_core::domain::{ClientId, Draft, DraftId};
use barkline_core::errors::{ApplicationError, InterfaceError};

use crate::pipeline::{DraftCard, Pipeline, SendReceipt};

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

/// Map an application failure to a wire response, logging the full detail
/// under a correlation id while the body carries only the user-safe message.
pub(crate) fn api_error(error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    let correlation_id = Uuid::new_v4().simple().to_string();
    let interface = InterfaceError::from_application(error, correlation_id);
    error!(
        event_name = "api.request.failed",
        correlation_id = %interface.correlation_id(),
        error = %interface,
    );

    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            error: interface.user_message(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

pub(crate) fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.to_string(),
            correlation_id: Uuid::new_v4().simple().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Reviewer-edited text; omitted or blank keeps the draft as-is.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    pub instruction: String,
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub client_id: Option<i64>,
    pub client_name: Option<String>,
    pub phone: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub message: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub dismissed: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/drafts", get(list_drafts))
        .route("/drafts/compose", post(compose_draft))
        .route("/drafts/queue", post(queue_draft))
        .route("/drafts/escalate", post(escalate))
        .route("/drafts/{id}/send", post(send_draft))
        .route("/drafts/{id}/dismiss", post(dismiss_draft))
        .route("/drafts/{id}/regenerate", post(regenerate_draft))
        .with_state(pipeline)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_drafts(
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<Vec<DraftCard>>, (StatusCode, Json<ApiError>)> {
    pipeline.list_drafts().await.map(Json).map_err(api_error)
}

async fn send_draft(
    Path(id): Path<String>,
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<SendRequest>,
) -> Result<Json<SendReceipt>, (StatusCode, Json<ApiError>)> {
    pipeline.send_draft(&DraftId(id), body.message).await.map(Json).map_err(api_error)
}

async fn dismiss_draft(
    Path(id): Path<String>,
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<DismissResponse>, (StatusCode, Json<ApiError>)> {
    pipeline.dismiss_draft(&DraftId(id)).await.map_err(api_error)?;
    Ok(Json(DismissResponse { dismissed: true }))
}

async fn regenerate_draft(
    Path(id): Path<String>,
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<RegenerateRequest>,
) -> Result<Json<Draft>, (StatusCode, Json<ApiError>)> {
    pipeline
        .regenerate_draft(&DraftId(id), &body.feedback)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn compose_draft(
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<ComposeRequest>,
) -> Result<Json<Draft>, (StatusCode, Json<ApiError>)> {
    if body.instruction.trim().is_empty() {
        return Err(bad_request("instruction is required"));
    }
    pipeline.compose(&body.instruction).await.map(Json).map_err(api_error)
}

async fn queue_draft(
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<QueueRequest>,
) -> Result<Json<Draft>, (StatusCode, Json<ApiError>)> {
    if body.phone.trim().is_empty() {
        return Err(bad_request("phone is required"));
    }
    if body.message.trim().is_empty() {
        return Err(bad_request("message is required"));
    }
    pipeline
        .queue_outbound(
            body.client_id.map(ClientId),
            body.client_name,
            &body.phone,
            &body.message,
        )
        .await
        .map(Json)
        .map_err(api_error)
}

async fn escalate(
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<EscalateRequest>,
) -> Result<Json<Draft>, (StatusCode, Json<ApiError>)> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message is required"));
    }
    pipeline.escalate(&body.message, &body.context).await.map(Json).map_err(api_error)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::pipeline::test_support::pipeline_with_defaults;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn queued_drafts_show_up_in_the_list() {
        let (pipeline, _dir) = pipeline_with_defaults();
        let router = super::router(pipeline);

        let response = router
            .clone()
            .oneshot(post_json(
                "/drafts/queue",
                json!({"phone": "6155550101", "message": "Reminder: Friday 10am"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let queued = body_json(response).await;
        assert_eq!(queued["phone"], "6155550101");
        assert_eq!(queued["client_name"], "(615) 555-0101");

        let response = router
            .oneshot(Request::builder().uri("/drafts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["draft"], "Reminder: Friday 10am");
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_up_front() {
        let (pipeline, _dir) = pipeline_with_defaults();
        let router = super::router(pipeline);

        let response = router
            .clone()
            .oneshot(post_json("/drafts/queue", json!({"phone": "", "message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["correlation_id"].is_string());

        let response = router
            .oneshot(post_json("/drafts/compose", json!({"instruction": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_draft_operations_return_not_found() {
        let (pipeline, _dir) = pipeline_with_defaults();
        let router = super::router(pipeline);

        let response = router
            .oneshot(post_json("/drafts/ghost/dismiss", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn regenerate_without_feedback_is_a_bad_request() {
        let (pipeline, _dir) = pipeline_with_defaults();
        let draft = pipeline
            .queue_outbound(None, None, "6155550101", "original text")
            .await
            .unwrap();
        let router = super::router(pipeline);

        let response = router
            .oneshot(post_json(
                &format!("/drafts/{}/regenerate", draft.draft_id),
                json!({"feedback": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn escalate_deduplicates_through_the_api() {
        let (pipeline, _dir) = pipeline_with_defaults();
        let router = super::router(pipeline);

        let first = body_json(
            router
                .clone()
                .oneshot(post_json(
                    "/drafts/escalate",
                    json!({"message": "Do we board overnight?", "context": "client 42"}),
                ))
                .await
                .unwrap(),
        )
        .await;
        let second = body_json(
            router
                .oneshot(post_json("/drafts/escalate", json!({"message": "Another question"})))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(first["draft_id"], second["draft_id"]);
    }
}
