//! Task-store operations.
//!
//! Every manager here works against one already-resolved store pool; which
//! store that is gets decided by [`crate::routing`].

pub mod columns;
pub mod comments;
pub mod mirror;
pub mod personal;
pub mod tasks;

pub use columns::ColumnManager;
pub use comments::CommentManager;
pub use mirror::MirrorManager;
pub use personal::{PersonalTaskManager, PersonalTaskUpdate};
pub use tasks::{NewTask, TaskManager, TaskUpdate};

use crate::db::models::TASK_STATUSES;
use crate::error::{BridgeError, Result};

pub(crate) fn validate_status(status: &str) -> Result<()> {
    if TASK_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(BridgeError::InvalidInput(format!(
            "Invalid status: '{}' (expected one of {})",
            status,
            TASK_STATUSES.join(", ")
        )))
    }
}

pub(crate) fn validate_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BridgeError::InvalidInput("Title cannot be empty".into()));
    }
    Ok(title)
}
