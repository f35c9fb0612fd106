#[cfg(test)]
pub mod test_helpers {
    use crate::config::BridgeConfig;
    use crate::db::models::{Organization, Project, User};
    use crate::db::{create_pool, open_metadata, run_store_migrations};
    use crate::organizations::OrganizationManager;
    use crate::outbox::OutboxDispatcher;
    use crate::projects::ProjectManager;
    use crate::resolver::StoreRegistry;
    use crate::routing::TaskStoreResolver;
    use crate::users::UserManager;
    use sqlx::SqlitePool;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Metadata store, store cache and config rooted in a temp dir.
    pub struct TestContext {
        pub meta: SqlitePool,
        pub config: BridgeConfig,
        pub registry: Arc<StoreRegistry>,
        pub _temp_dir: TempDir,
    }

    impl TestContext {
        pub async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let config = BridgeConfig::with_data_dir(temp_dir.path());
            let meta = open_metadata(&config.metadata_db_path()).await.unwrap();

            Self {
                meta,
                config,
                registry: Arc::new(StoreRegistry::new()),
                _temp_dir: temp_dir,
            }
        }

        pub fn meta(&self) -> &SqlitePool {
            &self.meta
        }

        pub fn data_dir(&self) -> &Path {
            self._temp_dir.path()
        }

        /// A resolver over this context. Picks up the current `config`.
        pub fn resolver(&self) -> TaskStoreResolver {
            TaskStoreResolver::new(
                self.meta.clone(),
                self.registry.clone(),
                Arc::new(self.config.clone()),
            )
        }

        pub fn dispatcher(&self) -> OutboxDispatcher {
            OutboxDispatcher::new(self.resolver(), self.config.outbox.clone())
        }

        pub async fn user(&self, email: &str, organization_id: Option<&str>) -> User {
            UserManager::new(&self.meta)
                .create(email, "", organization_id)
                .await
                .unwrap()
        }

        /// Project metadata only; its mirror entry stays pending.
        pub async fn project(
            &self,
            name: &str,
            organization_id: Option<&str>,
            owner_id: &str,
        ) -> Project {
            ProjectManager::new(&self.meta)
                .create_project(name, None, organization_id, owner_id)
                .await
                .unwrap()
                .project
        }

        /// Project with its mirror delivered and linked.
        pub async fn mirrored_project(
            &self,
            name: &str,
            organization_id: Option<&str>,
            owner_id: &str,
        ) -> Project {
            let mgr = ProjectManager::new(&self.meta);
            let created = mgr
                .create_project(name, None, organization_id, owner_id)
                .await
                .unwrap();
            self.dispatcher()
                .deliver_now(created.outbox_id)
                .await
                .unwrap();
            let project = mgr.get_project(&created.project.id).await.unwrap();
            assert!(project.custom_db_project_id.is_some());
            project
        }

        /// Organization with its own store file under the temp dir.
        pub async fn dedicated_org(&self, name: &str) -> Organization {
            let url = format!(
                "sqlite://{}",
                self.data_dir()
                    .join("orgs")
                    .join(format!("{}.db", name.to_lowercase()))
                    .display()
            );
            OrganizationManager::new(&self.meta)
                .create(name, Some(&url))
                .await
                .unwrap()
        }

        /// Organization served by the admin store.
        pub async fn shared_org(&self, name: &str) -> Organization {
            OrganizationManager::new(&self.meta)
                .create(name, None)
                .await
                .unwrap()
        }

        /// Organization whose store can never be opened: the parent of its
        /// database path is a regular file.
        pub async fn broken_org(&self, name: &str) -> Organization {
            let blocker = self.data_dir().join(format!("{}-blocker", name.to_lowercase()));
            std::fs::write(&blocker, b"not a directory").unwrap();
            let url = format!("sqlite://{}", blocker.join("tasks.db").display());
            OrganizationManager::new(&self.meta)
                .create(name, Some(&url))
                .await
                .unwrap()
        }
    }

    /// A migrated task store on its own.
    pub async fn store_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&temp_dir.path().join("store.db")).await.unwrap();
        run_store_migrations(&pool).await.unwrap();
        (temp_dir, pool)
    }
}
