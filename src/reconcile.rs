//! Cross-store consistency check.
//!
//! The outbox makes mirror writes eventually consistent; reconciliation
//! catches what it cannot, such as links lost mid-write, stores restored
//! from backup, or organizations whose store moved.

use crate::bridge::ProjectBridge;
use crate::db::models::Project;
use crate::error::{BridgeError, Result};
use crate::organizations::OrganizationManager;
use crate::outbox::{enqueue, OutboxEvent, OutboxManager};
use crate::projects::{ProjectFilter, ProjectManager};
use crate::resolver::StoreTarget;
use crate::routing::TaskStoreResolver;
use crate::store::mirror::MirrorManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// No link and no pending mirror entry.
    MissingMirror { meta_id: String },
    /// The link points at a mirror its store does not have.
    DanglingLink { meta_id: String, store_id: String },
    /// A mirror nobody links to.
    OrphanMirror {
        target: StoreTarget,
        store_id: String,
        meta_project_id: String,
    },
    /// The mirror was written but the link was not.
    Unlinked { meta_id: String, store_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreachableStore {
    pub target: StoreTarget,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub scanned_projects: usize,
    pub scanned_stores: Vec<StoreTarget>,
    pub unreachable: Vec<UnreachableStore>,
    pub findings: Vec<Finding>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.unreachable.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub requeued: usize,
    pub relinked: usize,
    pub pruned: usize,
    pub skipped: usize,
}

pub struct Reconciler {
    resolver: TaskStoreResolver,
}

impl Reconciler {
    pub fn new(resolver: TaskStoreResolver) -> Self {
        Self { resolver }
    }

    /// Compare every metadata project with the mirrors in every known store.
    pub async fn scan(&self) -> Result<ReconcileReport> {
        let meta = self.resolver.meta();
        let projects = ProjectManager::new(meta)
            .list_projects(&ProjectFilter::default())
            .await?;
        let outbox = OutboxManager::new(meta);

        let mut report = ReconcileReport {
            scanned_projects: projects.len(),
            ..ReconcileReport::default()
        };

        // Where each project should be mirrored
        let mut expected: HashMap<String, StoreTarget> = HashMap::new();
        for project in &projects {
            let target = self
                .resolver
                .target_for_project(project.organization_id.as_deref(), &project.owner_id)
                .await?;
            expected.insert(project.id.clone(), target);
        }

        let mut handles = HashMap::new();
        let mut locations: HashMap<StoreTarget, PathBuf> = HashMap::new();
        for target in self.known_targets(&projects).await? {
            let location = self.resolver.location_of(&target).await?;
            match self.resolver.open_strict(&target).await {
                Ok(handle) => {
                    report.scanned_stores.push(target.clone());
                    locations.insert(target.clone(), same_file(&location));
                    handles.insert(target, handle);
                },
                Err(BridgeError::StoreUnavailable { reason, .. }) => {
                    tracing::warn!(store = %target, reason = %reason, "Store unreachable during reconcile");
                    report.unreachable.push(UnreachableStore { target, reason });
                },
                Err(e) => return Err(e),
            }
        }

        // Targets sharing one file are scanned once, under the first of them
        let mut files: Vec<(PathBuf, StoreTarget)> = Vec::new();
        for target in &report.scanned_stores {
            if let Some(location) = locations.get(target) {
                if !files.iter().any(|(l, _)| l == location) {
                    files.push((location.clone(), target.clone()));
                }
            }
        }

        // Metadata side
        for project in &projects {
            let Some(target) = expected.get(&project.id) else {
                continue;
            };
            let Some(handle) = handles.get(target) else {
                continue;
            };
            let mirrors = MirrorManager::new(&handle.pool);

            match project.custom_db_project_id.as_deref() {
                Some(store_id) => {
                    if mirrors.find_mirror(store_id).await?.is_none() {
                        report.findings.push(Finding::DanglingLink {
                            meta_id: project.id.clone(),
                            store_id: store_id.to_string(),
                        });
                    }
                },
                None => {
                    if let Some(mirror) = mirrors.find_by_meta_id(&project.id).await? {
                        report.findings.push(Finding::Unlinked {
                            meta_id: project.id.clone(),
                            store_id: mirror.id,
                        });
                    } else if !outbox.has_pending(&project.id, "project.mirror").await? {
                        report.findings.push(Finding::MissingMirror {
                            meta_id: project.id.clone(),
                        });
                    }
                },
            }
        }

        // Store side
        let by_id: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
        for (location, target) in &files {
            let Some(handle) = handles.get(target) else {
                continue;
            };
            for mirror in MirrorManager::new(&handle.pool).list_mirrors().await? {
                let orphaned = match by_id.get(mirror.meta_project_id.as_str()) {
                    None => !outbox
                        .has_pending(&mirror.meta_project_id, "project.delete")
                        .await?,
                    Some(project) => {
                        let elsewhere = expected
                            .get(&project.id)
                            .and_then(|t| locations.get(t))
                            .is_some_and(|l| l != location);
                        let linked_to_other = project
                            .custom_db_project_id
                            .as_deref()
                            .is_some_and(|id| id != mirror.id);
                        elsewhere || linked_to_other
                    },
                };
                if orphaned {
                    report.findings.push(Finding::OrphanMirror {
                        target: target.clone(),
                        store_id: mirror.id,
                        meta_project_id: mirror.meta_project_id,
                    });
                }
            }
        }

        tracing::info!(
            projects = report.scanned_projects,
            stores = report.scanned_stores.len(),
            unreachable = report.unreachable.len(),
            findings = report.findings.len(),
            "Reconcile scan finished"
        );
        Ok(report)
    }

    /// Fix what `scan` found. Orphan mirrors are only deleted with `prune`.
    pub async fn repair(&self, report: &ReconcileReport, prune: bool) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();
        let meta = self.resolver.meta();
        let bridge = ProjectBridge::new(meta);

        for finding in &report.findings {
            match finding {
                Finding::MissingMirror { meta_id } | Finding::DanglingLink { meta_id, .. } => {
                    let Some(project) = bridge.find_by_meta_id(meta_id).await? else {
                        summary.skipped += 1;
                        continue;
                    };
                    self.requeue_mirror(&project).await?;
                    summary.requeued += 1;
                },
                Finding::Unlinked { meta_id, store_id } => match bridge.link(meta_id, store_id).await {
                    Ok(()) => summary.relinked += 1,
                    Err(e @ (BridgeError::Conflict(_) | BridgeError::ProjectNotFound(_))) => {
                        tracing::warn!(meta_id = %meta_id, store_id = %store_id, error = %e, "Could not relink");
                        summary.skipped += 1;
                    },
                    Err(e) => return Err(e),
                },
                Finding::OrphanMirror {
                    target, store_id, ..
                } => {
                    if !prune {
                        summary.skipped += 1;
                        continue;
                    }
                    let handle = self.resolver.open_strict(target).await?;
                    if MirrorManager::new(&handle.pool)
                        .delete_mirror(store_id)
                        .await?
                    {
                        tracing::info!(store = %target, store_id = %store_id, "Pruned orphan mirror");
                        summary.pruned += 1;
                    } else {
                        summary.skipped += 1;
                    }
                },
            }
        }

        Ok(summary)
    }

    /// Clear the link and schedule a fresh mirror in one transaction.
    async fn requeue_mirror(&self, project: &Project) -> Result<i64> {
        let mut tx = self.resolver.meta().begin().await?;
        sqlx::query("UPDATE projects SET custom_db_project_id = NULL, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(&project.id)
            .execute(&mut *tx)
            .await?;
        let outbox_id = enqueue(
            &mut *tx,
            &OutboxEvent::ProjectMirror {
                meta_project_id: project.id.clone(),
                organization_id: project.organization_id.clone(),
                owner_id: project.owner_id.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(project_id = %project.id, outbox_id, "Mirror requeued");
        Ok(outbox_id)
    }

    /// Admin, every dedicated organization store, and the user store of
    /// every owner of an org-less project.
    async fn known_targets(&self, projects: &[Project]) -> Result<Vec<StoreTarget>> {
        let mut targets = vec![StoreTarget::Admin];

        for org in OrganizationManager::new(self.resolver.meta())
            .list_with_dedicated_store()
            .await?
        {
            targets.push(StoreTarget::Organization(org.id));
        }

        let owners: BTreeSet<&str> = projects
            .iter()
            .filter(|p| p.organization_id.is_none())
            .map(|p| p.owner_id.as_str())
            .collect();
        targets.extend(owners.into_iter().map(|o| StoreTarget::User(o.to_string())));

        Ok(targets)
    }
}

/// Comparable form of a store file path. The parent directory exists once
/// the store has been opened.
fn same_file(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => dir
            .canonicalize()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
