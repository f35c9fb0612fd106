use crate::bridge::ProjectBridge;
use crate::db::models::Project;
use crate::error::{BridgeError, Result};
use crate::ids::new_meta_id;
use crate::organizations::OrganizationManager;
use crate::outbox::{enqueue, OutboxEvent};
use crate::users::UserManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

const PROJECT_COLUMNS: &str = "id, name, description, organization_id, owner_id, custom_db_project_id, created_at, updated_at";

/// A freshly created project and the outbox entry that will mirror it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub project: Project,
    pub outbox_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<String>,
    #[serde(default, alias = "ownerId")]
    pub owner_id: Option<String>,
}

/// Project metadata. Every write that the task store has to follow is
/// paired with an outbox entry in the same transaction.
pub struct ProjectManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProjectManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        organization_id: Option<&str>,
        owner_id: &str,
    ) -> Result<ProjectCreated> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidInput("Project name cannot be empty".into()));
        }

        let owner = UserManager::new(self.pool).get(owner_id).await?;
        if let Some(org_id) = organization_id {
            OrganizationManager::new(self.pool).get(org_id).await?;
            if owner.organization_id.as_deref() != Some(org_id) {
                return Err(BridgeError::Conflict(format!(
                    "User {} is not a member of organization {}",
                    owner_id, org_id
                )));
            }
        }

        let id = new_meta_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, organization_id, owner_id,
                                  custom_db_project_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(organization_id)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let outbox_id = enqueue(
            &mut *tx,
            &OutboxEvent::ProjectMirror {
                meta_project_id: id.clone(),
                organization_id: organization_id.map(str::to_string),
                owner_id: owner_id.to_string(),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(project_id = %id, organization_id = ?organization_id, outbox_id, "Project created");
        let project = self.get_project(&id).await?;
        Ok(ProjectCreated { project, outbox_id })
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        ProjectBridge::new(self.pool)
            .find_by_meta_id(id)
            .await?
            .ok_or_else(|| BridgeError::ProjectNotFound(id.to_string()))
    }

    pub async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(format!(
            "SELECT {} FROM projects WHERE 1 = 1",
            PROJECT_COLUMNS
        ));
        if let Some(org) = filter.organization_id.as_deref() {
            builder.push(" AND organization_id = ").push_bind(org);
        }
        if let Some(owner) = filter.owner_id.as_deref() {
            builder.push(" AND owner_id = ").push_bind(owner);
        }
        builder.push(" ORDER BY created_at, id");

        let projects = builder
            .build_query_as::<Project>()
            .fetch_all(self.pool)
            .await?;
        Ok(projects)
    }

    pub async fn rename_project(&self, id: &str, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidInput("Project name cannot be empty".into()));
        }
        let current = self.get_project(id).await?;
        if current.name == name {
            return Ok(current);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE projects SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        enqueue(
            &mut *tx,
            &OutboxEvent::ProjectRename {
                meta_project_id: id.to_string(),
                name: name.to_string(),
            },
        )
        .await?;
        tx.commit().await?;

        self.get_project(id).await
    }

    /// Delete project metadata. The mirror, its tasks and comments are
    /// removed by the outbox entry written alongside. Returns its ID.
    pub async fn delete_project(&self, id: &str) -> Result<i64> {
        let project = self.get_project(id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let outbox_id = enqueue(
            &mut *tx,
            &OutboxEvent::ProjectDelete {
                meta_project_id: project.id.clone(),
                store_project_id: project.custom_db_project_id.clone(),
                organization_id: project.organization_id.clone(),
                owner_id: project.owner_id.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(project_id = %id, outbox_id, "Project deleted");
        Ok(outbox_id)
    }
}
