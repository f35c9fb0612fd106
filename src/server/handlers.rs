use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use super::models::*;
use super::server::AppState;
use crate::bridge::ProjectBridge;
use crate::db::models::AnyTask;
use crate::error::{BridgeError, Result};
use crate::organizations::OrganizationManager;
use crate::outbox::OutboxManager;
use crate::projects::{ProjectFilter, ProjectManager};
use crate::reconcile::Reconciler;
use crate::routing::{Collection, RequestContext, RouteDescription, TaskStoreRoute};
use crate::store::{
    ColumnManager, CommentManager, NewTask, PersonalTaskManager, PersonalTaskUpdate, TaskManager,
    TaskUpdate,
};
use crate::users::UserManager;

const DEFAULT_OUTBOX_LIMIT: i64 = 100;

fn ok<T: serde::Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

fn created<T: serde::Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse { data })).into_response()
}

/// Writes never land in a stand-in store.
fn writable(route: &TaskStoreRoute) -> Result<()> {
    if route.degraded {
        return Err(BridgeError::StoreUnavailable {
            target: route.target.to_string(),
            reason: "store is down; only reads are served from the admin store".into(),
        });
    }
    Ok(())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "taskbridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cached_stores: state.resolver.registry().len().await,
    })
}

// ── Organizations and users ─────────────────────────────────────

pub async fn create_organization(
    State(state): State<AppState>,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<Response> {
    let org = OrganizationManager::new(state.resolver.meta())
        .create(&req.name, req.database_url.as_deref())
        .await?;
    Ok(created(org))
}

pub async fn list_organizations(State(state): State<AppState>) -> Result<Response> {
    let orgs = OrganizationManager::new(state.resolver.meta()).list().await?;
    Ok(ok(orgs))
}

pub async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let org = OrganizationManager::new(state.resolver.meta()).get(&id).await?;
    Ok(ok(org))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Response> {
    let user = UserManager::new(state.resolver.meta())
        .create(
            &req.email,
            req.display_name.as_deref().unwrap_or_default(),
            req.organization_id.as_deref(),
        )
        .await?;
    Ok(created(user))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let user = UserManager::new(state.resolver.meta()).get(&id).await?;
    Ok(ok(user))
}

// ── Projects ────────────────────────────────────────────────────

pub async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Response> {
    let projects = ProjectManager::new(state.resolver.meta())
        .list_projects(&filter)
        .await?;
    Ok(ok(projects))
}

/// Creates the metadata record and tries to mirror it right away. If the
/// task store is down the project is still created; the outbox worker
/// finishes the mirror later.
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Response> {
    let mgr = ProjectManager::new(state.resolver.meta());
    let created_project = mgr
        .create_project(
            &req.name,
            req.description.as_deref(),
            req.organization_id.as_deref(),
            &req.owner_id,
        )
        .await?;

    if let Err(e) = state.dispatcher.deliver_now(created_project.outbox_id).await {
        tracing::warn!(project_id = %created_project.project.id, error = %e, "Inline mirror failed, left to the outbox worker");
    }

    let project = mgr.get_project(&created_project.project.id).await?;
    Ok(created(project))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let meta = state.resolver.meta();
    let project = ProjectBridge::new(meta).resolve(&id).await?;
    let project = ProjectManager::new(meta).get_project(&project.meta_id).await?;
    Ok(ok(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Response> {
    let meta = state.resolver.meta();
    let project = ProjectBridge::new(meta).resolve(&id).await?;
    let updated = ProjectManager::new(meta)
        .rename_project(&project.meta_id, &req.name)
        .await?;
    Ok(ok(updated))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let meta = state.resolver.meta();
    let project = ProjectBridge::new(meta).resolve(&id).await?;
    let outbox_id = ProjectManager::new(meta)
        .delete_project(&project.meta_id)
        .await?;

    if let Err(e) = state.dispatcher.deliver_now(outbox_id).await {
        tracing::warn!(project_id = %project.meta_id, error = %e, "Inline mirror delete failed, left to the outbox worker");
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_columns(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let route = state
        .resolver
        .resolve_task_store(&RequestContext::for_project(id))
        .await?;
    let project = route
        .project
        .as_ref()
        .ok_or_else(|| BridgeError::InvalidInput("Route has no project".into()))?;
    let columns = ColumnManager::new(&route.store.pool)
        .list_columns(project.require_store_id()?)
        .await?;
    Ok(ok(columns))
}

pub async fn create_column(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateColumnRequest>,
) -> Result<Response> {
    let route = state
        .resolver
        .resolve_task_store(&RequestContext::for_project(id))
        .await?;
    writable(&route)?;
    let project = route
        .project
        .as_ref()
        .ok_or_else(|| BridgeError::InvalidInput("Route has no project".into()))?;
    let column = ColumnManager::new(&route.store.pool)
        .add_column(project.require_store_id()?, &req.name)
        .await?;
    Ok(created(column))
}

// ── Tasks ───────────────────────────────────────────────────────

/// Project tasks when a project is given, otherwise the user's personal
/// tasks.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Response> {
    let route = state.resolver.resolve_task_store(&query.context).await?;

    let tasks = match route.collection {
        Collection::Tasks => {
            let project = route
                .project
                .as_ref()
                .ok_or_else(|| BridgeError::InvalidInput("Route has no project".into()))?;
            TaskManager::new(&route.store.pool)
                .list_tasks(project.require_store_id()?, query.status.as_deref())
                .await?
                .into_iter()
                .map(AnyTask::Project)
                .collect()
        },
        Collection::PersonalTasks => {
            let user_id = personal_owner(&query.context)?;
            PersonalTaskManager::new(&route.store.pool)
                .list_personal_tasks(&user_id)
                .await?
                .into_iter()
                .filter(|t| query.status.as_deref().map_or(true, |s| t.status == s))
                .map(AnyTask::Personal)
                .collect()
        },
    };

    Ok(ok(TaskListResponse {
        route: RouteDescription::from(&route),
        tasks,
    }))
}

fn personal_owner(ctx: &RequestContext) -> Result<String> {
    ctx.clone()
        .normalized()
        .user_id
        .ok_or_else(|| BridgeError::InvalidInput("user_id is required for personal tasks".into()))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Response> {
    let route = state.resolver.resolve_task_store(&req.context).await?;
    writable(&route)?;

    let task = match route.collection {
        Collection::Tasks => {
            let project = route
                .project
                .as_ref()
                .ok_or_else(|| BridgeError::InvalidInput("Route has no project".into()))?;
            let task = TaskManager::new(&route.store.pool)
                .add_task(
                    project.require_store_id()?,
                    NewTask {
                        title: req.title,
                        description: req.description,
                        column_id: req.column_id,
                        status: req.status,
                        priority: req.priority,
                        assignee_id: req.assignee_id,
                    },
                )
                .await?;
            AnyTask::Project(task)
        },
        Collection::PersonalTasks => {
            if req.column_id.is_some() {
                return Err(BridgeError::InvalidInput(
                    "Personal tasks have no board columns".into(),
                ));
            }
            let user_id = personal_owner(&req.context)?;
            let mgr = PersonalTaskManager::new(&route.store.pool);
            let mut task = mgr
                .add_personal_task(
                    &user_id,
                    &req.title,
                    req.description.as_deref(),
                    req.priority,
                    req.due_at,
                )
                .await?;
            if let Some(status) = req.status.as_deref().filter(|s| *s != task.status) {
                task = mgr
                    .update_personal_task(
                        &task.id,
                        PersonalTaskUpdate {
                            status: Some(status),
                            ..PersonalTaskUpdate::default()
                        },
                    )
                    .await?;
            }
            AnyTask::Personal(task)
        },
    };

    Ok(created(TaskResponse {
        route: RouteDescription::from(&route),
        task,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(ctx): Query<RequestContext>,
) -> Result<Response> {
    let located = state.resolver.locate_task(&id, &ctx).await?;
    Ok(ok(TaskResponse {
        route: RouteDescription::from(&located.route),
        task: located.task,
    }))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(ctx): Query<RequestContext>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Response> {
    let located = state.resolver.locate_task(&id, &ctx).await?;
    writable(&located.route)?;
    let pool = &located.route.store.pool;

    let task = match located.task {
        AnyTask::Project(_) => {
            if req.due_at.is_some() {
                return Err(BridgeError::InvalidInput(
                    "Project tasks have no due date".into(),
                ));
            }
            let task = TaskManager::new(pool)
                .update_task(
                    &id,
                    TaskUpdate {
                        title: req.title.as_deref(),
                        description: req.description.as_deref(),
                        column_id: req.column_id.as_deref(),
                        status: req.status.as_deref(),
                        priority: req.priority,
                        assignee_id: req.assignee_id.as_deref(),
                    },
                )
                .await?;
            AnyTask::Project(task)
        },
        AnyTask::Personal(_) => {
            if req.column_id.is_some() || req.assignee_id.is_some() {
                return Err(BridgeError::InvalidInput(
                    "Personal tasks have no column or assignee".into(),
                ));
            }
            let task = PersonalTaskManager::new(pool)
                .update_personal_task(
                    &id,
                    PersonalTaskUpdate {
                        title: req.title.as_deref(),
                        description: req.description.as_deref(),
                        status: req.status.as_deref(),
                        priority: req.priority,
                        due_at: req.due_at,
                    },
                )
                .await?;
            AnyTask::Personal(task)
        },
    };

    Ok(ok(TaskResponse {
        route: RouteDescription::from(&located.route),
        task,
    }))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(ctx): Query<RequestContext>,
) -> Result<Response> {
    let located = state.resolver.locate_task(&id, &ctx).await?;
    writable(&located.route)?;
    let pool = &located.route.store.pool;

    match located.task {
        AnyTask::Project(_) => TaskManager::new(pool).delete_task(&id).await?,
        AnyTask::Personal(_) => PersonalTaskManager::new(pool).delete_personal_task(&id).await?,
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(ctx): Query<RequestContext>,
) -> Result<Response> {
    let located = state.resolver.locate_task(&id, &ctx).await?;
    let comments = CommentManager::new(&located.route.store.pool)
        .list_comments(&id)
        .await?;
    Ok(ok(comments))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(ctx): Query<RequestContext>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<Response> {
    let located = state.resolver.locate_task(&id, &ctx).await?;
    writable(&located.route)?;
    let comment = CommentManager::new(&located.route.store.pool)
        .add_comment(&id, &req.author_id, &req.body)
        .await?;
    Ok(created(comment))
}

/// Explain where a request with these hints would go.
pub async fn resolve(
    State(state): State<AppState>,
    Query(ctx): Query<RequestContext>,
) -> Result<Response> {
    let route = state.resolver.resolve_task_store(&ctx).await?;
    Ok(ok(RouteDescription::from(&route)))
}

// ── Admin ───────────────────────────────────────────────────────

pub async fn flush_outbox(
    State(state): State<AppState>,
    Query(query): Query<OutboxQuery>,
) -> Result<Response> {
    let summary = state
        .dispatcher
        .process_pending(query.limit.unwrap_or(DEFAULT_OUTBOX_LIMIT))
        .await?;
    let stats = OutboxManager::new(state.resolver.meta()).stats().await?;
    Ok(ok(FlushResponse { summary, stats }))
}

pub async fn list_outbox(
    State(state): State<AppState>,
    Query(query): Query<OutboxQuery>,
) -> Result<Response> {
    let outbox = OutboxManager::new(state.resolver.meta());
    let entries = outbox
        .list(query.status.as_deref(), query.limit.unwrap_or(DEFAULT_OUTBOX_LIMIT))
        .await?;
    let stats = outbox.stats().await?;
    Ok(ok(OutboxResponse { stats, entries }))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Response> {
    let reconciler = Reconciler::new(state.resolver.clone());
    let report = reconciler.scan().await?;
    let repair = if query.repair {
        Some(reconciler.repair(&report, query.prune).await?)
    } else {
        None
    };
    Ok(ok(ReconcileResponse { report, repair }))
}
