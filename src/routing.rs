//! Per-request task-store routing.
//!
//! Every request resolves its task store through [`TaskStoreResolver`], in
//! this order:
//!
//! 1. a project is given: the project's organization decides (a conflicting
//!    organization hint is rejected); org-less projects live in the owner's
//!    user store;
//! 2. an organization hint is given: that organization's store;
//! 3. a user hint is given: the user's organization store if they belong to
//!    one, else the user's own store;
//! 4. otherwise the admin store.
//!
//! Organizations without a dedicated database resolve to the admin store.
//! An organization store that cannot be opened degrades to the admin store
//! when `admin_fallback` is enabled.

use crate::bridge::{ProjectBridge, ProjectRef};
use crate::config::BridgeConfig;
use crate::db::models::AnyTask;
use crate::error::{BridgeError, Result};
use crate::ids::{classify, IdSpace};
use crate::organizations::OrganizationManager;
use crate::resolver::{resolve_database_url, StoreHandle, StoreRegistry, StoreTarget};
use crate::store::personal::PersonalTaskManager;
use crate::store::tasks::TaskManager;
use crate::users::UserManager;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

/// Routing hints carried by a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "projectId")]
    pub project_id: Option<String>,
}

impl RequestContext {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Empty strings count as absent.
    pub fn normalized(mut self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        self.organization_id = clean(self.organization_id);
        self.user_id = clean(self.user_id);
        self.project_id = clean(self.project_id);
        self
    }
}

/// Which collection of the task store a request reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "tasks")]
    Tasks,
    #[serde(rename = "personalTasks")]
    PersonalTasks,
}

impl Collection {
    pub fn select(ctx: &RequestContext) -> Self {
        if ctx.project_id.is_some() {
            Collection::Tasks
        } else {
            Collection::PersonalTasks
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::PersonalTasks => "personalTasks",
        }
    }
}

/// Result of routing one request.
#[derive(Debug, Clone)]
pub struct TaskStoreRoute {
    pub store: StoreHandle,
    pub collection: Collection,
    /// Where the data belongs.
    pub target: StoreTarget,
    pub project: Option<ProjectRef>,
    /// True when `store` is the admin store standing in for `target`.
    pub degraded: bool,
}

/// Serializable explanation of a route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDescription {
    pub target: StoreTarget,
    pub served_by: StoreTarget,
    pub collection: Collection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectRef>,
    pub degraded: bool,
}

impl From<&TaskStoreRoute> for RouteDescription {
    fn from(route: &TaskStoreRoute) -> Self {
        Self {
            target: route.target.clone(),
            served_by: route.store.target.clone(),
            collection: route.collection,
            project: route.project.clone(),
            degraded: route.degraded,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocatedTask {
    pub route: TaskStoreRoute,
    pub task: AnyTask,
}

#[derive(Clone)]
pub struct TaskStoreResolver {
    meta: SqlitePool,
    registry: Arc<StoreRegistry>,
    config: Arc<BridgeConfig>,
}

impl TaskStoreResolver {
    pub fn new(meta: SqlitePool, registry: Arc<StoreRegistry>, config: Arc<BridgeConfig>) -> Self {
        Self {
            meta,
            registry,
            config,
        }
    }

    /// Open the metadata store described by `config` with an empty
    /// store cache.
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        let meta = crate::db::open_metadata(&config.metadata_db_path()).await?;
        Ok(Self::new(
            meta,
            Arc::new(StoreRegistry::new()),
            Arc::new(config),
        ))
    }

    pub fn meta(&self) -> &SqlitePool {
        &self.meta
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ── Target selection ────────────────────────────────────────

    pub async fn target_for_organization(&self, organization_id: &str) -> Result<StoreTarget> {
        let org = OrganizationManager::new(&self.meta)
            .get(organization_id)
            .await?;
        Ok(match org.database_url {
            Some(_) => StoreTarget::Organization(org.id),
            None => StoreTarget::Admin,
        })
    }

    pub async fn target_for_user(&self, user_id: &str) -> Result<StoreTarget> {
        let user = UserManager::new(&self.meta).get(user_id).await?;
        match user.organization_id {
            Some(org_id) => self.target_for_organization(&org_id).await,
            None => Ok(StoreTarget::User(user.id)),
        }
    }

    pub async fn target_for_project(
        &self,
        organization_id: Option<&str>,
        owner_id: &str,
    ) -> Result<StoreTarget> {
        match organization_id {
            Some(org_id) => self.target_for_organization(org_id).await,
            None => Ok(StoreTarget::User(owner_id.to_string())),
        }
    }

    // ── Opening stores ──────────────────────────────────────────

    /// The database file a target maps to. Distinct targets may share one.
    pub(crate) async fn location_of(&self, target: &StoreTarget) -> Result<PathBuf> {
        match target {
            StoreTarget::Organization(org_id) => {
                let org = OrganizationManager::new(&self.meta).get(org_id).await?;
                match org.database_url.as_deref() {
                    Some(url) => resolve_database_url(url, &self.config.data_dir),
                    None => Ok(self.config.admin_db_path()),
                }
            },
            StoreTarget::User(user_id) => {
                // User IDs become file names; only metadata-shaped IDs allowed
                if classify(user_id)? != IdSpace::Metadata {
                    return Err(BridgeError::InvalidInput(format!(
                        "'{}' is not a user ID",
                        user_id
                    )));
                }
                Ok(self.config.user_db_path(user_id))
            },
            StoreTarget::Admin => Ok(self.config.admin_db_path()),
        }
    }

    /// Open a target without any fallback.
    pub async fn open_strict(&self, target: &StoreTarget) -> Result<StoreHandle> {
        let location = self.location_of(target).await?;
        self.registry.get_or_open(target, &location).await
    }

    /// Open a target, degrading to the admin store per policy.
    /// Returns the handle and whether it is degraded.
    pub async fn open(&self, target: &StoreTarget) -> Result<(StoreHandle, bool)> {
        match self.open_strict(target).await {
            Ok(handle) => Ok((handle, false)),
            Err(BridgeError::StoreUnavailable { target: t, reason })
                if self.config.admin_fallback && *target != StoreTarget::Admin =>
            {
                tracing::warn!(store = %t, reason = %reason, "Task store unavailable, falling back to admin store");
                let admin = self.open_strict(&StoreTarget::Admin).await?;
                Ok((admin, true))
            },
            Err(e) => Err(e),
        }
    }

    // ── Routing ─────────────────────────────────────────────────

    pub async fn resolve_task_store(&self, ctx: &RequestContext) -> Result<TaskStoreRoute> {
        let ctx = ctx.clone().normalized();
        let collection = Collection::select(&ctx);

        let (target, project) = if let Some(project_id) = ctx.project_id.as_deref() {
            let project = ProjectBridge::new(&self.meta).resolve(project_id).await?;
            if let (Some(hint), Some(actual)) = (
                ctx.organization_id.as_deref(),
                project.organization_id.as_deref(),
            ) {
                if hint != actual {
                    return Err(BridgeError::Conflict(format!(
                        "Project {} belongs to organization {}, not {}",
                        project.meta_id, actual, hint
                    )));
                }
            }
            let target = self
                .target_for_project(project.organization_id.as_deref(), &project.owner_id)
                .await?;
            (target, Some(project))
        } else if let Some(org_id) = ctx.organization_id.as_deref() {
            (self.target_for_organization(org_id).await?, None)
        } else if let Some(user_id) = ctx.user_id.as_deref() {
            (self.target_for_user(user_id).await?, None)
        } else {
            (StoreTarget::Admin, None)
        };

        let (store, degraded) = self.open(&target).await?;

        tracing::debug!(
            store = %target,
            served_by = %store.target,
            collection = collection.as_str(),
            degraded,
            "Resolved task store"
        );

        Ok(TaskStoreRoute {
            store,
            collection,
            target,
            project,
            degraded,
        })
    }

    /// Candidate targets for a lookup by task ID, most specific first.
    pub async fn candidate_targets(&self, ctx: &RequestContext) -> Result<Vec<StoreTarget>> {
        let ctx = ctx.clone().normalized();
        let mut targets = Vec::new();

        if let Some(project_id) = ctx.project_id.as_deref() {
            let project = ProjectBridge::new(&self.meta).resolve(project_id).await?;
            targets.push(
                self.target_for_project(project.organization_id.as_deref(), &project.owner_id)
                    .await?,
            );
        }
        if let Some(org_id) = ctx.organization_id.as_deref() {
            targets.push(self.target_for_organization(org_id).await?);
        }
        if let Some(user_id) = ctx.user_id.as_deref() {
            targets.push(self.target_for_user(user_id).await?);
            let own = StoreTarget::User(user_id.to_string());
            targets.push(own);
        }
        targets.push(StoreTarget::Admin);

        let mut seen = std::collections::HashSet::new();
        targets.retain(|t| seen.insert(t.clone()));
        Ok(targets)
    }

    /// Find a task by ID without knowing where it lives.
    ///
    /// Searches the candidate stores in routing order, project collection
    /// first, and returns the first hit.
    pub async fn locate_task(&self, task_id: &str, ctx: &RequestContext) -> Result<LocatedTask> {
        if classify(task_id)? != IdSpace::Store {
            return Err(BridgeError::InvalidInput(format!(
                "'{}' is not a task ID",
                task_id
            )));
        }

        // Opened strictly; admin is the last candidate in its own right
        for target in self.candidate_targets(ctx).await? {
            let store = match self.open_strict(&target).await {
                Ok(store) => store,
                Err(e @ BridgeError::StoreUnavailable { .. }) => {
                    tracing::warn!(store = %target, error = %e, "Skipping unavailable store during lookup");
                    continue;
                },
                Err(e) => return Err(e),
            };

            if let Some(task) = TaskManager::new(&store.pool).find_task(task_id).await? {
                let project = ProjectBridge::new(&self.meta)
                    .find_by_store_id(&task.project_id)
                    .await?
                    .map(ProjectRef::from);
                return Ok(LocatedTask {
                    route: TaskStoreRoute {
                        store,
                        collection: Collection::Tasks,
                        target,
                        project,
                        degraded: false,
                    },
                    task: AnyTask::Project(task),
                });
            }

            if let Some(task) = PersonalTaskManager::new(&store.pool)
                .find_personal_task(task_id)
                .await?
            {
                return Ok(LocatedTask {
                    route: TaskStoreRoute {
                        store,
                        collection: Collection::PersonalTasks,
                        target,
                        project: None,
                        degraded: false,
                    },
                    task: AnyTask::Personal(task),
                });
            }
        }

        Err(BridgeError::TaskNotFound(task_id.to_string()))
    }
}
