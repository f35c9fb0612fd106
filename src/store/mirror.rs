use crate::db::models::{MirrorProject, DEFAULT_COLUMNS};
use crate::error::{BridgeError, Result};
use crate::ids::new_store_id;
use chrono::Utc;
use sqlx::SqlitePool;

const MIRROR_COLUMNS: &str = "id, meta_project_id, name, organization_id, created_at";

/// Task-store side of a project.
pub struct MirrorManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MirrorManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the mirror of `meta_project_id` with the default board
    /// columns, or return the existing one.
    pub async fn create_mirror(
        &self,
        meta_project_id: &str,
        name: &str,
        organization_id: Option<&str>,
    ) -> Result<MirrorProject> {
        if let Some(existing) = self.find_by_meta_id(meta_project_id).await? {
            return Ok(existing);
        }

        let id = new_store_id();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO projects (id, meta_project_id, name, organization_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(meta_project_id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(meta_project_id)
        .bind(name)
        .bind(organization_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        // Another dispatcher mirrored it since the lookup above
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return self
                .find_by_meta_id(meta_project_id)
                .await?
                .ok_or_else(|| BridgeError::ProjectNotFound(meta_project_id.to_string()));
        }

        for (position, column) in DEFAULT_COLUMNS.iter().enumerate() {
            sqlx::query("INSERT INTO columns (id, project_id, name, position) VALUES (?, ?, ?, ?)")
                .bind(new_store_id())
                .bind(&id)
                .bind(*column)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.get_mirror(&id).await
    }

    pub async fn get_mirror(&self, id: &str) -> Result<MirrorProject> {
        self.find_mirror(id)
            .await?
            .ok_or_else(|| BridgeError::ProjectNotFound(id.to_string()))
    }

    pub async fn find_mirror(&self, id: &str) -> Result<Option<MirrorProject>> {
        let mirror = sqlx::query_as::<_, MirrorProject>(&format!(
            "SELECT {} FROM projects WHERE id = ?",
            MIRROR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(mirror)
    }

    pub async fn find_by_meta_id(&self, meta_project_id: &str) -> Result<Option<MirrorProject>> {
        let mirror = sqlx::query_as::<_, MirrorProject>(&format!(
            "SELECT {} FROM projects WHERE meta_project_id = ?",
            MIRROR_COLUMNS
        ))
        .bind(meta_project_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(mirror)
    }

    pub async fn list_mirrors(&self) -> Result<Vec<MirrorProject>> {
        let mirrors = sqlx::query_as::<_, MirrorProject>(&format!(
            "SELECT {} FROM projects ORDER BY id",
            MIRROR_COLUMNS
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(mirrors)
    }

    pub async fn rename_mirror(&self, id: &str, name: &str) -> Result<()> {
        sqlx::query("UPDATE projects SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete a mirror with its columns, tasks and their comments.
    /// Returns false if it did not exist.
    pub async fn delete_mirror(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM comments WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM tasks WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM columns WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
