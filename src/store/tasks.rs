use crate::db::models::Task;
use crate::error::{BridgeError, Result};
use crate::ids::new_store_id;
use crate::store::columns::ColumnManager;
use crate::store::mirror::MirrorManager;
use crate::store::{validate_status, validate_title};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

const TASK_COLUMNS: &str = "id, project_id, column_id, title, description, status, priority, \
                            assignee_id, position, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
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
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskUpdate<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub column_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub priority: Option<i64>,
    pub assignee_id: Option<&'a str>,
}

impl TaskUpdate<'_> {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.column_id.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
    }
}

/// Project tasks (`tasks` collection).
pub struct TaskManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a task to a project board. Without a column the task lands in
    /// the first column, at the bottom.
    pub async fn add_task(&self, project_id: &str, new: NewTask) -> Result<Task> {
        let title = validate_title(&new.title)?;
        let status = new.status.as_deref().unwrap_or("todo");
        validate_status(status)?;

        MirrorManager::new(self.pool).get_mirror(project_id).await?;

        let column_id = match new.column_id.as_deref() {
            Some(column_id) => {
                self.check_column(project_id, column_id).await?;
                Some(column_id.to_string())
            },
            None => ColumnManager::new(self.pool)
                .list_columns(project_id)
                .await?
                .into_iter()
                .next()
                .map(|c| c.id),
        };

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(self.pool)
        .await?;

        let id = new_store_id();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tasks (id, project_id, column_id, title, description, status, priority,
                               assignee_id, position, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(project_id)
        .bind(&column_id)
        .bind(title)
        .bind(&new.description)
        .bind(status)
        .bind(new.priority.unwrap_or(0))
        .bind(&new.assignee_id)
        .bind(position)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.get_task(&id).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.find_task(id)
            .await?
            .ok_or_else(|| BridgeError::TaskNotFound(id.to_string()))
    }

    pub async fn find_task(&self, id: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = ?",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(task)
    }

    pub async fn list_tasks(&self, project_id: &str, status: Option<&str>) -> Result<Vec<Task>> {
        if let Some(s) = status {
            validate_status(s)?;
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(format!(
            "SELECT {} FROM tasks WHERE project_id = ",
            TASK_COLUMNS
        ));
        builder.push_bind(project_id);
        if let Some(s) = status {
            builder.push(" AND status = ").push_bind(s);
        }
        builder.push(" ORDER BY position, created_at");

        let tasks = builder.build_query_as::<Task>().fetch_all(self.pool).await?;
        Ok(tasks)
    }

    pub async fn update_task(&self, id: &str, update: TaskUpdate<'_>) -> Result<Task> {
        let task = self.get_task(id).await?;
        if update.is_empty() {
            return Ok(task);
        }

        let title = update.title.map(validate_title).transpose()?;
        if let Some(s) = update.status {
            validate_status(s)?;
        }
        if let Some(column_id) = update.column_id {
            self.check_column(&task.project_id, column_id).await?;
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE tasks SET updated_at = ");
        builder.push_bind(Utc::now());

        if let Some(t) = title {
            builder.push(", title = ").push_bind(t);
        }
        if let Some(d) = update.description {
            builder.push(", description = ").push_bind(d);
        }
        if let Some(c) = update.column_id {
            builder.push(", column_id = ").push_bind(c);
        }
        if let Some(s) = update.status {
            builder.push(", status = ").push_bind(s);
        }
        if let Some(p) = update.priority {
            builder.push(", priority = ").push_bind(p);
        }
        if let Some(a) = update.assignee_id {
            builder.push(", assignee_id = ").push_bind(a);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.build().execute(self.pool).await?;

        self.get_task(id).await
    }

    /// Delete a task and its comments.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BridgeError::TaskNotFound(id.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn check_column(&self, project_id: &str, column_id: &str) -> Result<()> {
        let column = ColumnManager::new(self.pool).get_column(column_id).await?;
        if column.project_id != project_id {
            return Err(BridgeError::InvalidInput(format!(
                "Column {} does not belong to project {}",
                column_id, project_id
            )));
        }
        Ok(())
    }
}
