use super::utils::{emit, print_project};
use crate::bridge::ProjectBridge;
use crate::cli::{OrgCommands, ProjectCommands, UserCommands};
use crate::error::Result;
use crate::organizations::OrganizationManager;
use crate::outbox::OutboxDispatcher;
use crate::projects::{ProjectFilter, ProjectManager};
use crate::routing::TaskStoreResolver;
use crate::users::UserManager;

pub async fn handle_org_command(resolver: &TaskStoreResolver, cmd: OrgCommands) -> Result<()> {
    let orgs = OrganizationManager::new(resolver.meta());

    match cmd {
        OrgCommands::Add {
            name,
            database_url,
            format,
        } => {
            let org = orgs.create(&name, database_url.as_deref()).await?;
            emit(&format, &org, |o| {
                println!("Created organization {} ({})", o.id, o.name);
            })
        },
        OrgCommands::List { format } => {
            let list = orgs.list().await?;
            emit(&format, &list, |list| {
                if list.is_empty() {
                    println!("No organizations");
                }
                for o in list {
                    println!(
                        "{}  {}  {}",
                        o.id,
                        o.name,
                        o.database_url.as_deref().unwrap_or("(admin store)")
                    );
                }
            })
        },
        OrgCommands::SetDb {
            id,
            database_url,
            format,
        } => {
            let org = orgs.set_database_url(&id, database_url.as_deref()).await?;
            // Cached handles for the old location are reopened on next use
            resolver
                .registry()
                .invalidate(&crate::resolver::StoreTarget::Organization(org.id.clone()))
                .await;
            emit(&format, &org, |o| {
                println!(
                    "Organization {} now uses {}",
                    o.id,
                    o.database_url.as_deref().unwrap_or("the admin store")
                );
            })
        },
    }
}

pub async fn handle_user_command(resolver: &TaskStoreResolver, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add {
            email,
            name,
            organization,
            format,
        } => {
            let user = UserManager::new(resolver.meta())
                .create(
                    &email,
                    name.as_deref().unwrap_or_default(),
                    organization.as_deref(),
                )
                .await?;
            emit(&format, &user, |u| {
                println!("Created user {} <{}>", u.id, u.email);
            })
        },
    }
}

pub async fn handle_project_command(
    resolver: &TaskStoreResolver,
    cmd: ProjectCommands,
) -> Result<()> {
    let projects = ProjectManager::new(resolver.meta());

    match cmd {
        ProjectCommands::Create {
            name,
            owner,
            organization,
            description,
            format,
        } => {
            let created = projects
                .create_project(
                    &name,
                    description.as_deref(),
                    organization.as_deref(),
                    &owner,
                )
                .await?;

            let dispatcher =
                OutboxDispatcher::new(resolver.clone(), resolver.config().outbox.clone());
            if let Err(e) = dispatcher.deliver_now(created.outbox_id).await {
                tracing::warn!(project_id = %created.project.id, error = %e, "Mirror not written yet");
            }

            let project = projects.get_project(&created.project.id).await?;
            emit(&format, &project, print_project)
        },
        ProjectCommands::Show { id, format } => {
            let r = ProjectBridge::new(resolver.meta()).resolve(&id).await?;
            let project = projects.get_project(&r.meta_id).await?;
            emit(&format, &project, print_project)
        },
        ProjectCommands::List {
            organization,
            owner,
            format,
        } => {
            let list = projects
                .list_projects(&ProjectFilter {
                    organization_id: organization,
                    owner_id: owner,
                })
                .await?;
            emit(&format, &list, |list| {
                if list.is_empty() {
                    println!("No projects");
                }
                for p in list {
                    println!(
                        "{}  {}  {}",
                        p.id,
                        p.custom_db_project_id.as_deref().unwrap_or("(pending)"),
                        p.name
                    );
                }
            })
        },
    }
}
