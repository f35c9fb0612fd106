use crate::db::models::Column;
use crate::error::{BridgeError, Result};
use crate::ids::new_store_id;
use crate::store::mirror::MirrorManager;
use sqlx::SqlitePool;

pub struct ColumnManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ColumnManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_columns(&self, project_id: &str) -> Result<Vec<Column>> {
        let columns = sqlx::query_as::<_, Column>(
            "SELECT id, project_id, name, position FROM columns WHERE project_id = ? ORDER BY position, id",
        )
        .bind(project_id)
        .fetch_all(self.pool)
        .await?;
        Ok(columns)
    }

    pub async fn get_column(&self, id: &str) -> Result<Column> {
        sqlx::query_as::<_, Column>("SELECT id, project_id, name, position FROM columns WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| BridgeError::ColumnNotFound(id.to_string()))
    }

    /// Append a column at the end of the board.
    pub async fn add_column(&self, project_id: &str, name: &str) -> Result<Column> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidInput("Column name cannot be empty".into()));
        }
        MirrorManager::new(self.pool).get_mirror(project_id).await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM columns WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(self.pool)
        .await?;

        let id = new_store_id();
        sqlx::query("INSERT INTO columns (id, project_id, name, position) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(project_id)
            .bind(name)
            .bind(next)
            .execute(self.pool)
            .await?;

        self.get_column(&id).await
    }

    pub async fn rename_column(&self, id: &str, name: &str) -> Result<Column> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidInput("Column name cannot be empty".into()));
        }
        let result = sqlx::query("UPDATE columns SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BridgeError::ColumnNotFound(id.to_string()));
        }
        self.get_column(id).await
    }

    /// Delete an empty column.
    pub async fn delete_column(&self, id: &str) -> Result<()> {
        self.get_column(id).await?;

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE column_id = ?")
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        if remaining > 0 {
            return Err(BridgeError::ActionNotAllowed(format!(
                "Column {} still holds {} task(s)",
                id, remaining
            )));
        }

        sqlx::query("DELETE FROM columns WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
