use crate::db::models::User;
use crate::error::{BridgeError, Result};
use crate::ids::new_meta_id;
use crate::organizations::OrganizationManager;
use chrono::Utc;
use sqlx::SqlitePool;

pub struct UserManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        email: &str,
        display_name: &str,
        organization_id: Option<&str>,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(BridgeError::InvalidInput(format!(
                "Invalid email address: '{}'",
                email
            )));
        }

        if let Some(org_id) = organization_id {
            OrganizationManager::new(self.pool).get(org_id).await?;
        }

        let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(self.pool)
            .await?;
        if taken.is_some() {
            return Err(BridgeError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };

        let id = new_meta_id();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, organization_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&display_name)
        .bind(organization_id)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;

        tracing::info!(user_id = %id, organization_id = ?organization_id, "User created");
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, organization_id, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| BridgeError::UserNotFound(id.to_string()))
    }

    pub async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, display_name, organization_id, created_at FROM users
            WHERE organization_id = ?
            ORDER BY email
            "#,
        )
        .bind(organization_id)
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_create_user_without_org() {
        let ctx = TestContext::new().await;
        let mgr = UserManager::new(ctx.meta());

        let user = mgr.create("Ada@Example.com", "Ada", None).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(user.organization_id.is_none());
    }

    #[tokio::test]
    async fn test_display_name_defaults_to_local_part() {
        let ctx = TestContext::new().await;
        let mgr = UserManager::new(ctx.meta());
        let user = mgr.create("grace@example.com", "  ", None).await.unwrap();
        assert_eq!(user.display_name, "grace");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let ctx = TestContext::new().await;
        let mgr = UserManager::new(ctx.meta());
        mgr.create("a@example.com", "A", None).await.unwrap();
        assert!(matches!(
            mgr.create("A@example.com", "B", None).await,
            Err(BridgeError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_org_rejected() {
        let ctx = TestContext::new().await;
        let mgr = UserManager::new(ctx.meta());
        assert!(matches!(
            mgr.create("a@example.com", "A", Some("missing")).await,
            Err(BridgeError::OrganizationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_organization() {
        let ctx = TestContext::new().await;
        let org = OrganizationManager::new(ctx.meta())
            .create("Acme", None)
            .await
            .unwrap();
        let mgr = UserManager::new(ctx.meta());
        mgr.create("b@example.com", "B", Some(&org.id)).await.unwrap();
        mgr.create("a@example.com", "A", Some(&org.id)).await.unwrap();
        mgr.create("solo@example.com", "S", None).await.unwrap();

        let members = mgr.list_by_organization(&org.id).await.unwrap();
        let emails: Vec<_> = members.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }
}
