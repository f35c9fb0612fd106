use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Action not allowed: {0}")]
    ActionNotAllowed(String),

    #[error("Project {0} has no task-store mirror yet")]
    MirrorPending(String),

    #[error("Task store unavailable for {target}: {reason}")]
    StoreUnavailable { target: String, reason: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    OtherError(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl BridgeError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            BridgeError::DatabaseError(_) => "DATABASE_ERROR",
            BridgeError::InvalidInput(_) => "INVALID_INPUT",
            BridgeError::OrganizationNotFound(_) => "ORGANIZATION_NOT_FOUND",
            BridgeError::UserNotFound(_) => "USER_NOT_FOUND",
            BridgeError::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            BridgeError::TaskNotFound(_) => "TASK_NOT_FOUND",
            BridgeError::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            BridgeError::CommentNotFound(_) => "COMMENT_NOT_FOUND",
            BridgeError::Conflict(_) => "CONFLICT",
            BridgeError::ActionNotAllowed(_) => "ACTION_NOT_ALLOWED",
            BridgeError::MirrorPending(_) => "MIRROR_PENDING",
            BridgeError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BridgeError::OrganizationNotFound(_)
                | BridgeError::UserNotFound(_)
                | BridgeError::ProjectNotFound(_)
                | BridgeError::TaskNotFound(_)
                | BridgeError::ColumnNotFound(_)
                | BridgeError::CommentNotFound(_)
        )
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
