use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crew_comments::AuthorRole;

pub const WORKER_ID_HEADER: &str = "x-worker-id";
pub const ROLE_HEADER: &str = "x-role";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Caller identity as set by the upstream auth proxy.
pub struct RequestIdentity {
    pub worker_id: Option<String>,
    pub role: AuthorRole,
}

impl RequestIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let worker_id = headers
            .get(WORKER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let role = match headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
        {
            Some("admin") => AuthorRole::Admin,
            _ => AuthorRole::Worker,
        };
        Self { worker_id, role }
    }

    /// Worker id for worker-scoped routes; absent means the proxy did not
    /// authenticate the caller.
    pub fn require_worker_id(&self) -> Result<&str, Response> {
        self.worker_id.as_deref().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"code": "unauthorized", "message": "missing worker identity"}})),
            )
                .into_response()
        })
    }

    pub fn require_admin(&self) -> Result<(), Response> {
        if self.role.is_admin() {
            return Ok(());
        }
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": "forbidden", "message": "admin role required"}})),
        )
            .into_response())
    }
}
