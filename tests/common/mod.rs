//! Common utilities for integration tests

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskbridge::config::BridgeConfig;
use taskbridge::db::open_metadata;
use taskbridge::db::models::{Organization, Project, User};
use taskbridge::organizations::OrganizationManager;
use taskbridge::outbox::OutboxDispatcher;
use taskbridge::projects::ProjectManager;
use taskbridge::resolver::StoreRegistry;
use taskbridge::routing::TaskStoreResolver;
use taskbridge::users::UserManager;
use tempfile::TempDir;

/// Path to the `taskbridge` binary, honoring custom target directories.
#[allow(dead_code, deprecated)]
pub fn taskbridge_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_taskbridge")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("taskbridge"))
}

/// A `taskbridge` command isolated to `data_dir`.
#[allow(dead_code)]
pub fn taskbridge_command(data_dir: &Path) -> Command {
    let mut cmd = Command::new(taskbridge_binary());
    cmd.env("HOME", "/nonexistent")
        .env("TASKBRIDGE_DATA_DIR", data_dir)
        .env_remove("TASKBRIDGE_ADMIN_FALLBACK")
        .env_remove("TASKBRIDGE_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

/// Parse a command's stdout as JSON.
#[allow(dead_code)]
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Library-level environment rooted in a temp dir.
#[allow(dead_code)]
pub struct TestEnv {
    pub resolver: TaskStoreResolver,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut BridgeConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = BridgeConfig::with_data_dir(dir.path());
        adjust(&mut config);
        let meta = open_metadata(&config.metadata_db_path()).await.unwrap();
        let resolver =
            TaskStoreResolver::new(meta, Arc::new(StoreRegistry::new()), Arc::new(config));
        Self { resolver, dir }
    }

    pub fn dispatcher(&self) -> OutboxDispatcher {
        OutboxDispatcher::new(
            self.resolver.clone(),
            self.resolver.config().outbox.clone(),
        )
    }

    pub fn org_db_url(&self, name: &str) -> String {
        format!(
            "sqlite://{}",
            self.dir.path().join("orgs").join(format!("{}.db", name)).display()
        )
    }

    /// A URL that can never be opened: its parent is a regular file.
    pub fn broken_db_url(&self, name: &str) -> String {
        let blocker = self.dir.path().join(format!("{}-blocker", name));
        std::fs::write(&blocker, b"x").unwrap();
        format!("sqlite://{}", blocker.join("tasks.db").display())
    }

    pub async fn org(&self, name: &str, database_url: Option<&str>) -> Organization {
        OrganizationManager::new(self.resolver.meta())
            .create(name, database_url)
            .await
            .unwrap()
    }

    pub async fn user(&self, email: &str, organization_id: Option<&str>) -> User {
        UserManager::new(self.resolver.meta())
            .create(email, "", organization_id)
            .await
            .unwrap()
    }

    /// Create a project and deliver its mirror.
    pub async fn mirrored_project(
        &self,
        name: &str,
        organization_id: Option<&str>,
        owner_id: &str,
    ) -> Project {
        let mgr = ProjectManager::new(self.resolver.meta());
        let created = mgr
            .create_project(name, None, organization_id, owner_id)
            .await
            .unwrap();
        self.dispatcher()
            .deliver_now(created.outbox_id)
            .await
            .unwrap();
        mgr.get_project(&created.project.id).await.unwrap()
    }
}
