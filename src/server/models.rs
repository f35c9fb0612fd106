use crate::db::models::{AnyTask, OutboxEntry, OutboxStats};
use crate::error::BridgeError;
use crate::outbox::DispatchSummary;
use crate::reconcile::{ReconcileReport, RepairSummary};
use crate::routing::{RequestContext, RouteDescription};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn status_for(error: &BridgeError) -> StatusCode {
    match error {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        BridgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BridgeError::Conflict(_) => StatusCode::CONFLICT,
        BridgeError::ActionNotAllowed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BridgeError::MirrorPending(_) | BridgeError::StoreUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(code = self.to_error_code(), error = %self, "Request failed");
        }

        let details = match &self {
            BridgeError::StoreUnavailable { target, .. } => {
                Some(serde_json::json!({ "store": target }))
            },
            BridgeError::MirrorPending(project_id) => {
                Some(serde_json::json!({ "project_id": project_id, "retry": true }))
            },
            _ => None,
        };

        (
            status,
            Json(ApiError {
                code: self.to_error_code().to_string(),
                message: self.to_string(),
                details,
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub cached_stores: usize,
}

#[derive(Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    #[serde(default, alias = "databaseUrl")]
    pub database_url: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<String>,
    #[serde(alias = "ownerId")]
    pub owner_id: String,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateColumnRequest {
    pub name: String,
}

/// Create task request. Routing hints ride along in the body.
#[derive(Deserialize)]
pub struct CreateTaskRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "columnId")]
    pub column_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default, alias = "assigneeId")]
    pub assignee_id: Option<String>,
    #[serde(default, alias = "dueAt")]
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Default)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default, alias = "columnId")]
    pub column_id: Option<String>,
    #[serde(default, alias = "assigneeId")]
    pub assignee_id: Option<String>,
    #[serde(default, alias = "dueAt")]
    pub due_at: Option<DateTime<Utc>>,
}

/// Query parameters for task list
#[derive(Deserialize)]
pub struct TaskListQuery {
    #[serde(flatten)]
    pub context: RequestContext,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    #[serde(alias = "authorId")]
    pub author_id: String,
    pub body: String,
}

#[derive(Serialize)]
pub struct TaskListResponse {
    pub route: RouteDescription,
    pub tasks: Vec<AnyTask>,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub route: RouteDescription,
    pub task: AnyTask,
}

#[derive(Deserialize)]
pub struct OutboxQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct OutboxResponse {
    pub stats: OutboxStats,
    pub entries: Vec<OutboxEntry>,
}

#[derive(Serialize)]
pub struct FlushResponse {
    pub summary: DispatchSummary,
    pub stats: OutboxStats,
}

#[derive(Deserialize, Default)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub repair: bool,
    #[serde(default)]
    pub prune: bool,
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub report: ReconcileReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&BridgeError::TaskNotFound("t".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&BridgeError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&BridgeError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&BridgeError::ActionNotAllowed("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&BridgeError::MirrorPending("p".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&BridgeError::OtherError(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_create_task_request_reads_hints() {
        let req: CreateTaskRequest = serde_json::from_str(
            r#"{"projectId":"abc","title":"T","columnId":"c1","priority":2}"#,
        )
        .unwrap();
        assert_eq!(req.context.project_id.as_deref(), Some("abc"));
        assert_eq!(req.column_id.as_deref(), Some("c1"));
        assert_eq!(req.priority, Some(2));
    }

    #[test]
    fn test_api_error_omits_empty_details() {
        let json = serde_json::to_string(&ApiError {
            code: "X".into(),
            message: "m".into(),
            details: None,
        })
        .unwrap();
        assert!(!json.contains("details"));
    }
}
