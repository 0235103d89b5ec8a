use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crew_comments::{
    find_for_worker_marking_read, mark_admin_replies_read, mark_comment_read, CommentStore,
    CommentStoreError,
};
use crew_relay::{LiveFanout, OutboundMessenger, ReplyDispatcher};

use crate::gateway_identity::RequestIdentity;
use crate::gateway_ws::handle_ws_upgrade;

pub struct AppState {
    pub store: Arc<CommentStore>,
    pub dispatcher: ReplyDispatcher,
    pub fanout: LiveFanout,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<CommentStore>,
        messenger: Arc<dyn OutboundMessenger>,
        fanout: LiveFanout,
    ) -> Self {
        Self {
            dispatcher: ReplyDispatcher::new(store.clone(), messenger),
            store,
            fanout,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    tenant_key: String,
}

#[derive(Debug, Deserialize)]
struct AddReplyRequest {
    #[serde(default)]
    text: String,
}

pub fn build_gateway_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_status))
        .route("/api/comments", post(handle_create_comment))
        .route("/api/comments/me", get(handle_my_comments))
        .route("/api/comments/worker/{worker_id}", get(handle_worker_comments))
        .route("/api/comments/tenant/{tenant_key}", get(handle_tenant_comments))
        .route(
            "/api/comments/unread-admin-replies",
            get(handle_unread_admin_replies),
        )
        .route(
            "/api/comments/mark-admin-replies-read",
            put(handle_mark_admin_replies_read),
        )
        .route(
            "/api/comments/{id}/replies",
            post(handle_add_reply).get(handle_list_replies),
        )
        .route("/api/comments/{id}/read", put(handle_mark_read))
        .route("/ws", get(handle_ws_upgrade))
        .with_state(state)
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "crew-gateway",
        "startedAt": state.started_at.to_rfc3339(),
        "connectedViewers": state.fanout.subscriber_count(),
    }))
}

async fn handle_create_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateCommentRequest>,
) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    let worker_id = match identity.require_worker_id() {
        Ok(worker_id) => worker_id.to_string(),
        Err(response) => return response,
    };
    let result = state
        .store
        .create_comment(&worker_id, &body.tenant_key, &body.text)
        .and_then(|comment| state.store.enrich(comment));
    match result {
        Ok(enriched) => (StatusCode::CREATED, Json(enriched)).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_add_reply(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddReplyRequest>,
) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    if let Err(response) = identity.require_worker_id() {
        return response;
    }
    match state
        .dispatcher
        .add_reply(&comment_id, &body.text, identity.role)
        .await
    {
        Ok(enriched) => (StatusCode::CREATED, Json(enriched)).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_my_comments(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    let worker_id = match identity.require_worker_id() {
        Ok(worker_id) => worker_id.to_string(),
        Err(response) => return response,
    };
    match find_for_worker_marking_read(&state.store, &worker_id) {
        Ok(comments) => Json(comments).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_worker_comments(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    if let Err(response) = identity.require_admin() {
        return response;
    }
    match state.store.find_for_worker(&worker_id) {
        Ok(comments) => Json(comments).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_tenant_comments(
    State(state): State<Arc<AppState>>,
    Path(tenant_key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    if let Err(response) = identity.require_admin() {
        return response;
    }
    let result = state
        .store
        .find_for_tenant(&tenant_key)
        .and_then(|comments| state.store.enrich_all(comments));
    match result {
        Ok(comments) => Json(comments).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_list_replies(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<String>,
) -> Response {
    match state.store.require_by_id(&comment_id) {
        Ok(comment) => Json(comment.replies).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_mark_read(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<String>,
) -> Response {
    match mark_comment_read(&state.store, &comment_id) {
        Ok(()) => Json(json!({"message": "Comment marked as read"})).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_unread_admin_replies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    let worker_id = match identity.require_worker_id() {
        Ok(worker_id) => worker_id.to_string(),
        Err(response) => return response,
    };
    match state.store.find_unread_admin_replies(&worker_id) {
        Ok(comments) => Json(comments).into_response(),
        Err(error) => store_error_response(error),
    }
}

async fn handle_mark_admin_replies_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let identity = RequestIdentity::from_headers(&headers);
    let worker_id = match identity.require_worker_id() {
        Ok(worker_id) => worker_id.to_string(),
        Err(response) => return response,
    };
    match mark_admin_replies_read(&state.store, &worker_id) {
        Ok(_) => Json(json!({"message": "Admin replies marked as read"})).into_response(),
        Err(error) => store_error_response(error),
    }
}

fn store_error_response(error: CommentStoreError) -> Response {
    match error {
        CommentStoreError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "not_found", "message": format!("comment '{id}' was not found")}})),
        )
            .into_response(),
        CommentStoreError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": "validation", "message": message}})),
        )
            .into_response(),
        CommentStoreError::Io(source) => {
            tracing::error!("comment store failure: {source:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"code": "internal_error", "message": "comment store failure"}})),
            )
                .into_response()
        }
    }
}
