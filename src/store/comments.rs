use crate::db::models::Comment;
use crate::error::{BridgeError, Result};
use crate::ids::new_store_id;
use chrono::Utc;
use sqlx::SqlitePool;

pub struct CommentManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommentManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Comment on a task from either collection in this store.
    pub async fn add_comment(&self, task_id: &str, author_id: &str, body: &str) -> Result<Comment> {
        let body = body.trim();
        if body.is_empty() {
            return Err(BridgeError::InvalidInput("Comment body cannot be empty".into()));
        }

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)
                OR EXISTS(SELECT 1 FROM personal_tasks WHERE id = ?1)
            "#,
        )
        .bind(task_id)
        .fetch_one(self.pool)
        .await?;
        if !exists {
            return Err(BridgeError::TaskNotFound(task_id.to_string()));
        }

        let comment = Comment {
            id: new_store_id(),
            task_id: task_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO comments (id, task_id, author_id, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.task_id)
        .bind(&comment.author_id)
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(self.pool)
        .await?;

        Ok(comment)
    }

    /// Oldest first.
    pub async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, task_id, author_id, body, created_at FROM comments WHERE task_id = ? ORDER BY created_at, id",
        )
        .bind(task_id)
        .fetch_all(self.pool)
        .await?;
        Ok(comments)
    }

    pub async fn delete_comment(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BridgeError::CommentNotFound(id.to_string()));
        }
        Ok(())
    }
}
