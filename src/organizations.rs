use crate::db::models::Organization;
use crate::error::{BridgeError, Result};
use crate::ids::new_meta_id;
use crate::resolver::parse_database_url;
use chrono::Utc;
use sqlx::SqlitePool;

pub struct OrganizationManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrganizationManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an organization. With `database_url` its tasks live in a
    /// dedicated store, otherwise in the admin store.
    pub async fn create(&self, name: &str, database_url: Option<&str>) -> Result<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidInput(
                "Organization name cannot be empty".into(),
            ));
        }
        if let Some(url) = database_url {
            parse_database_url(url)?;
        }

        let id = new_meta_id();
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, database_url, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(database_url)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;

        tracing::info!(organization_id = %id, dedicated_store = database_url.is_some(), "Organization created");
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<Organization> {
        sqlx::query_as::<_, Organization>(
            "SELECT id, name, database_url, created_at FROM organizations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| BridgeError::OrganizationNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Organization>> {
        let orgs = sqlx::query_as::<_, Organization>(
            "SELECT id, name, database_url, created_at FROM organizations ORDER BY created_at, id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(orgs)
    }

    /// Organizations with a dedicated store.
    pub async fn list_with_dedicated_store(&self) -> Result<Vec<Organization>> {
        let orgs = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, database_url, created_at FROM organizations
            WHERE database_url IS NOT NULL
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(orgs)
    }

    /// Point an organization at a different store (or back at the admin
    /// store with `None`). Existing data is not moved.
    pub async fn set_database_url(&self, id: &str, database_url: Option<&str>) -> Result<Organization> {
        if let Some(url) = database_url {
            parse_database_url(url)?;
        }

        let result = sqlx::query("UPDATE organizations SET database_url = ? WHERE id = ?")
            .bind(database_url)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::OrganizationNotFound(id.to_string()));
        }

        tracing::warn!(
            organization_id = %id,
            "Organization store location changed; existing tasks are not migrated"
        );
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_create_and_get() {
        let ctx = TestContext::new().await;
        let mgr = OrganizationManager::new(ctx.meta());

        let org = mgr.create("Acme", None).await.unwrap();
        assert_eq!(org.name, "Acme");
        assert!(org.database_url.is_none());
        assert_eq!(org.id.len(), crate::ids::META_ID_LEN);

        let fetched = mgr.get(&org.id).await.unwrap();
        assert_eq!(fetched.id, org.id);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let ctx = TestContext::new().await;
        let mgr = OrganizationManager::new(ctx.meta());
        assert!(matches!(
            mgr.create("   ", None).await,
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_unsupported_url() {
        let ctx = TestContext::new().await;
        let mgr = OrganizationManager::new(ctx.meta());
        let result = mgr.create("Acme", Some("mongodb://localhost:27017/acme")).await;
        assert!(matches!(result, Err(BridgeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let ctx = TestContext::new().await;
        let mgr = OrganizationManager::new(ctx.meta());
        assert!(matches!(
            mgr.get("nope").await,
            Err(BridgeError::OrganizationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_database_url() {
        let ctx = TestContext::new().await;
        let mgr = OrganizationManager::new(ctx.meta());
        let org = mgr.create("Acme", None).await.unwrap();

        let url = format!("sqlite://{}", ctx.data_dir().join("acme.db").display());
        let updated = mgr.set_database_url(&org.id, Some(&url)).await.unwrap();
        assert_eq!(updated.database_url.as_deref(), Some(url.as_str()));

        let dedicated = mgr.list_with_dedicated_store().await.unwrap();
        assert_eq!(dedicated.len(), 1);

        let cleared = mgr.set_database_url(&org.id, None).await.unwrap();
        assert!(cleared.database_url.is_none());
        assert!(mgr.list_with_dedicated_store().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_database_url_missing_org() {
        let ctx = TestContext::new().await;
        let mgr = OrganizationManager::new(ctx.meta());
        assert!(matches!(
            mgr.set_database_url("missing", None).await,
            Err(BridgeError::OrganizationNotFound(_))
        ));
    }
}
