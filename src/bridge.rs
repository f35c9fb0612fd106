//! Project ID bridge between the metadata store and the task stores.
//!
//! A project is created with a metadata ID and mirrored into a task store
//! under a store ID. `projects.custom_db_project_id` holds the link; the
//! unique index on it keeps the mapping one-to-one.

use crate::db::models::Project;
use crate::error::{BridgeError, Result};
use crate::ids::{classify, is_store_id, IdSpace};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Both identities of one project, plus what routing needs to place it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub meta_id: String,
    pub store_id: Option<String>,
    pub organization_id: Option<String>,
    pub owner_id: String,
    pub name: String,
}

impl From<Project> for ProjectRef {
    fn from(project: Project) -> Self {
        Self {
            meta_id: project.id,
            store_id: project.custom_db_project_id,
            organization_id: project.organization_id,
            owner_id: project.owner_id,
            name: project.name,
        }
    }
}

impl ProjectRef {
    pub fn require_store_id(&self) -> Result<&str> {
        self.store_id
            .as_deref()
            .ok_or_else(|| BridgeError::MirrorPending(self.meta_id.clone()))
    }
}

const PROJECT_COLUMNS: &str = "id, name, description, organization_id, owner_id, custom_db_project_id, created_at, updated_at";

pub struct ProjectBridge<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProjectBridge<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve a project ID from either ID space.
    pub async fn resolve(&self, any_id: &str) -> Result<ProjectRef> {
        let project = match classify(any_id)? {
            IdSpace::Metadata => self.find_by_meta_id(any_id).await?,
            IdSpace::Store => self.find_by_store_id(any_id).await?,
        };

        project
            .map(ProjectRef::from)
            .ok_or_else(|| BridgeError::ProjectNotFound(any_id.to_string()))
    }

    pub async fn find_by_meta_id(&self, meta_id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects WHERE id = ?",
            PROJECT_COLUMNS
        ))
        .bind(meta_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(project)
    }

    pub async fn find_by_store_id(&self, store_id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects WHERE custom_db_project_id = ?",
            PROJECT_COLUMNS
        ))
        .bind(store_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(project)
    }

    /// Record that `meta_id` is mirrored as `store_id`.
    ///
    /// Re-linking to the same store ID is a no-op. Linking a project that
    /// already points elsewhere, or a store ID already claimed by another
    /// project, is a conflict.
    pub async fn link(&self, meta_id: &str, store_id: &str) -> Result<()> {
        if !is_store_id(store_id) {
            return Err(BridgeError::InvalidInput(format!(
                "'{}' is not a task-store ID",
                store_id
            )));
        }

        let project = self
            .find_by_meta_id(meta_id)
            .await?
            .ok_or_else(|| BridgeError::ProjectNotFound(meta_id.to_string()))?;

        match project.custom_db_project_id.as_deref() {
            Some(existing) if existing == store_id => return Ok(()),
            Some(existing) => {
                return Err(BridgeError::Conflict(format!(
                    "Project {} is already linked to {}",
                    meta_id, existing
                )))
            },
            None => {},
        }

        if let Some(other) = self.find_by_store_id(store_id).await? {
            return Err(BridgeError::Conflict(format!(
                "Store project {} is already linked to {}",
                store_id, other.id
            )));
        }

        self.write_link(meta_id, store_id).await?;
        tracing::debug!(meta_id, store_id, "Linked project");
        Ok(())
    }

    /// Conditional link write. A concurrent link that got there first is
    /// reported as a conflict unless it recorded the same store ID.
    async fn write_link(&self, meta_id: &str, store_id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET custom_db_project_id = ?, updated_at = ?
            WHERE id = ? AND custom_db_project_id IS NULL
            "#,
        )
        .bind(store_id)
        .bind(chrono::Utc::now())
        .bind(meta_id)
        .execute(self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(BridgeError::Conflict(format!(
                    "Store project {} is already linked to another project",
                    store_id
                )));
            },
            Err(e) => return Err(e.into()),
        };

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current = self
            .find_by_meta_id(meta_id)
            .await?
            .ok_or_else(|| BridgeError::ProjectNotFound(meta_id.to_string()))?;
        match current.custom_db_project_id.as_deref() {
            Some(existing) if existing == store_id => Ok(()),
            Some(existing) => Err(BridgeError::Conflict(format!(
                "Project {} is already linked to {}",
                meta_id, existing
            ))),
            None => Err(BridgeError::ProjectNotFound(meta_id.to_string())),
        }
    }

    pub async fn unlink(&self, meta_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE projects SET custom_db_project_id = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(chrono::Utc::now())
        .bind(meta_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::ProjectNotFound(meta_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_store_id;
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_resolve_by_either_id() {
        let ctx = TestContext::new().await;
        let user = ctx.user("owner@example.com", None).await;
        let project = ctx.project("Board", None, &user.id).await;
        let bridge = ProjectBridge::new(ctx.meta());

        let store_id = new_store_id();
        bridge.link(&project.id, &store_id).await.unwrap();

        let by_meta = bridge.resolve(&project.id).await.unwrap();
        let by_store = bridge.resolve(&store_id).await.unwrap();

        assert_eq!(by_meta, by_store);
        assert_eq!(by_meta.store_id.as_deref(), Some(store_id.as_str()));
        assert_eq!(by_meta.owner_id, user.id);
    }

    #[tokio::test]
    async fn test_unlinked_project_is_pending() {
        let ctx = TestContext::new().await;
        let user = ctx.user("owner@example.com", None).await;
        let project = ctx.project("Board", None, &user.id).await;

        let r = ProjectBridge::new(ctx.meta())
            .resolve(&project.id)
            .await
            .unwrap();
        assert!(matches!(
            r.require_store_id(),
            Err(BridgeError::MirrorPending(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let ctx = TestContext::new().await;
        let bridge = ProjectBridge::new(ctx.meta());

        assert!(matches!(
            bridge.resolve("abcdefghij0123456789").await,
            Err(BridgeError::ProjectNotFound(_))
        ));
        assert!(matches!(
            bridge.resolve(&new_store_id()).await,
            Err(BridgeError::ProjectNotFound(_))
        ));
        assert!(matches!(
            bridge.resolve("bad id!").await,
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_link_is_one_to_one() {
        let ctx = TestContext::new().await;
        let user = ctx.user("owner@example.com", None).await;
        let a = ctx.project("A", None, &user.id).await;
        let b = ctx.project("B", None, &user.id).await;
        let bridge = ProjectBridge::new(ctx.meta());

        let store_id = new_store_id();
        bridge.link(&a.id, &store_id).await.unwrap();
        // idempotent
        bridge.link(&a.id, &store_id).await.unwrap();

        assert!(matches!(
            bridge.link(&b.id, &store_id).await,
            Err(BridgeError::Conflict(_))
        ));
        assert!(matches!(
            bridge.link(&a.id, &new_store_id()).await,
            Err(BridgeError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_losing_link_race_is_conflict() {
        let ctx = TestContext::new().await;
        let user = ctx.user("owner@example.com", None).await;
        let a = ctx.project("A", None, &user.id).await;
        let b = ctx.project("B", None, &user.id).await;
        let bridge = ProjectBridge::new(ctx.meta());

        // Both writers passed their checks; only the link write remains
        let won = new_store_id();
        bridge.write_link(&a.id, &won).await.unwrap();

        assert!(matches!(
            bridge.write_link(&a.id, &new_store_id()).await,
            Err(BridgeError::Conflict(_))
        ));
        assert!(matches!(
            bridge.write_link(&b.id, &won).await,
            Err(BridgeError::Conflict(_))
        ));
        bridge.write_link(&a.id, &won).await.unwrap();

        assert!(matches!(
            bridge.write_link("abcdefghij0123456789", &new_store_id()).await,
            Err(BridgeError::ProjectNotFound(_))
        ));
        let b_after = bridge.find_by_meta_id(&b.id).await.unwrap().unwrap();
        assert_eq!(b_after.custom_db_project_id, None);
    }

    #[tokio::test]
    async fn test_unlink_then_relink() {
        let ctx = TestContext::new().await;
        let user = ctx.user("owner@example.com", None).await;
        let project = ctx.project("A", None, &user.id).await;
        let bridge = ProjectBridge::new(ctx.meta());

        bridge.link(&project.id, &new_store_id()).await.unwrap();
        bridge.unlink(&project.id).await.unwrap();

        let fresh = new_store_id();
        bridge.link(&project.id, &fresh).await.unwrap();
        let r = bridge.resolve(&project.id).await.unwrap();
        assert_eq!(r.store_id.as_deref(), Some(fresh.as_str()));
    }

    #[tokio::test]
    async fn test_link_rejects_non_store_id() {
        let ctx = TestContext::new().await;
        let user = ctx.user("owner@example.com", None).await;
        let project = ctx.project("A", None, &user.id).await;
        assert!(matches!(
            ProjectBridge::new(ctx.meta())
                .link(&project.id, "short")
                .await,
            Err(BridgeError::InvalidInput(_))
        ));
    }
}
