use crate::db::models::PersonalTask;
use crate::error::{BridgeError, Result};
use crate::ids::new_store_id;
use crate::store::{validate_status, validate_title};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

const PERSONAL_COLUMNS: &str =
    "id, user_id, title, description, status, priority, due_at, created_at, updated_at";

#[derive(Debug, Clone, Copy, Default)]
pub struct PersonalTaskUpdate<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub status: Option<&'a str>,
    pub priority: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
}

/// Tasks that belong to a user rather than a project (`personalTasks`).
pub struct PersonalTaskManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PersonalTaskManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_personal_task(
        &self,
        user_id: &str,
        title: &str,
        description: Option<&str>,
        priority: Option<i64>,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<PersonalTask> {
        let title = validate_title(title)?;
        if user_id.trim().is_empty() {
            return Err(BridgeError::InvalidInput(
                "Personal tasks need an owning user".into(),
            ));
        }

        let id = new_store_id();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO personal_tasks (id, user_id, title, description, status, priority, due_at,
                                        created_at, updated_at)
            VALUES (?, ?, ?, ?, 'todo', ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(priority.unwrap_or(0))
        .bind(due_at)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.get_personal_task(&id).await
    }

    pub async fn get_personal_task(&self, id: &str) -> Result<PersonalTask> {
        self.find_personal_task(id)
            .await?
            .ok_or_else(|| BridgeError::TaskNotFound(id.to_string()))
    }

    pub async fn find_personal_task(&self, id: &str) -> Result<Option<PersonalTask>> {
        let task = sqlx::query_as::<_, PersonalTask>(&format!(
            "SELECT {} FROM personal_tasks WHERE id = ?",
            PERSONAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(task)
    }

    pub async fn list_personal_tasks(&self, user_id: &str) -> Result<Vec<PersonalTask>> {
        let tasks = sqlx::query_as::<_, PersonalTask>(&format!(
            "SELECT {} FROM personal_tasks WHERE user_id = ? ORDER BY created_at, id",
            PERSONAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(tasks)
    }

    pub async fn update_personal_task(
        &self,
        id: &str,
        update: PersonalTaskUpdate<'_>,
    ) -> Result<PersonalTask> {
        let current = self.get_personal_task(id).await?;

        let title = update.title.map(validate_title).transpose()?;
        if let Some(s) = update.status {
            validate_status(s)?;
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE personal_tasks SET updated_at = ");
        builder.push_bind(Utc::now());
        let mut changed = false;

        if let Some(t) = title {
            builder.push(", title = ").push_bind(t);
            changed = true;
        }
        if let Some(d) = update.description {
            builder.push(", description = ").push_bind(d);
            changed = true;
        }
        if let Some(s) = update.status {
            builder.push(", status = ").push_bind(s);
            changed = true;
        }
        if let Some(p) = update.priority {
            builder.push(", priority = ").push_bind(p);
            changed = true;
        }
        if let Some(d) = update.due_at {
            builder.push(", due_at = ").push_bind(d);
            changed = true;
        }

        if !changed {
            return Ok(current);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.build().execute(self.pool).await?;

        self.get_personal_task(id).await
    }

    pub async fn delete_personal_task(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM personal_tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BridgeError::TaskNotFound(id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::store_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_add_and_list_personal_tasks() {
        let (_dir, pool) = store_pool().await;
        let mgr = PersonalTaskManager::new(&pool);

        let due = Utc::now() + Duration::days(2);
        let task = mgr
            .add_personal_task("userA0000000000001", "Renew passport", None, Some(2), Some(due))
            .await
            .unwrap();
        assert_eq!(task.status, "todo");
        assert_eq!(task.priority, 2);
        assert!(task.due_at.is_some());

        mgr.add_personal_task("userB0000000000001", "Other", None, None, None)
            .await
            .unwrap();

        let mine = mgr.list_personal_tasks("userA0000000000001").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, task.id);
    }

    #[tokio::test]
    async fn test_add_personal_task_requires_user_and_title() {
        let (_dir, pool) = store_pool().await;
        let mgr = PersonalTaskManager::new(&pool);

        assert!(mgr
            .add_personal_task("", "Title", None, None, None)
            .await
            .is_err());
        assert!(mgr
            .add_personal_task("userA0000000000001", "  ", None, None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_personal_task() {
        let (_dir, pool) = store_pool().await;
        let mgr = PersonalTaskManager::new(&pool);
        let task = mgr
            .add_personal_task("userA0000000000001", "Draft", None, None, None)
            .await
            .unwrap();

        let unchanged = mgr
            .update_personal_task(&task.id, PersonalTaskUpdate::default())
            .await
            .unwrap();
        assert_eq!(unchanged.updated_at, task.updated_at);

        let updated = mgr
            .update_personal_task(
                &task.id,
                PersonalTaskUpdate {
                    title: Some("Final"),
                    status: Some("done"),
                    ..PersonalTaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.status, "done");

        assert!(mgr
            .update_personal_task(
                &task.id,
                PersonalTaskUpdate {
                    status: Some("archived"),
                    ..PersonalTaskUpdate::default()
                },
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_personal_task() {
        let (_dir, pool) = store_pool().await;
        let mgr = PersonalTaskManager::new(&pool);
        let task = mgr
            .add_personal_task("userA0000000000001", "Gone soon", None, None, None)
            .await
            .unwrap();

        mgr.delete_personal_task(&task.id).await.unwrap();
        assert!(mgr.find_personal_task(&task.id).await.unwrap().is_none());
        assert!(matches!(
            mgr.delete_personal_task(&task.id).await,
            Err(BridgeError::TaskNotFound(_))
        ));
    }
}
