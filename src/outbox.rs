//! Transactional outbox for writes that must reach a task store.
//!
//! Metadata writes append an entry in the same transaction. The dispatcher
//! later applies each entry to the resolved task store. Every effect is
//! idempotent, so an entry may be applied more than once.

use crate::bridge::ProjectBridge;
use crate::config::OutboxConfig;
use crate::db::models::{OutboxEntry, OutboxStats};
use crate::error::{BridgeError, Result};
use crate::routing::TaskStoreResolver;
use crate::store::mirror::MirrorManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;
use tokio::sync::watch;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_DONE: &str = "done";
pub const STATUS_FAILED: &str = "failed";

/// How long a claimed entry is hidden from other dispatchers.
const CLAIM_LEASE: Duration = Duration::from_secs(60);

const ENTRY_COLUMNS: &str = "id, kind, aggregate_id, payload, status, attempts, last_error, next_attempt_at, created_at, processed_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OutboxEvent {
    #[serde(rename = "project.mirror")]
    ProjectMirror {
        meta_project_id: String,
        organization_id: Option<String>,
        owner_id: String,
    },
    #[serde(rename = "project.rename")]
    ProjectRename {
        meta_project_id: String,
        name: String,
    },
    #[serde(rename = "project.delete")]
    ProjectDelete {
        meta_project_id: String,
        store_project_id: Option<String>,
        organization_id: Option<String>,
        owner_id: String,
    },
}

impl OutboxEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboxEvent::ProjectMirror { .. } => "project.mirror",
            OutboxEvent::ProjectRename { .. } => "project.rename",
            OutboxEvent::ProjectDelete { .. } => "project.delete",
        }
    }

    pub fn aggregate_id(&self) -> &str {
        match self {
            OutboxEvent::ProjectMirror {
                meta_project_id, ..
            }
            | OutboxEvent::ProjectRename {
                meta_project_id, ..
            }
            | OutboxEvent::ProjectDelete {
                meta_project_id, ..
            } => meta_project_id,
        }
    }
}

/// Append an event. Call this with the connection of the transaction that
/// performs the metadata write.
pub async fn enqueue(conn: &mut SqliteConnection, event: &OutboxEvent) -> Result<i64> {
    let payload = serde_json::to_string(event)?;
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO outbox (kind, aggregate_id, payload, status, attempts, next_attempt_at, created_at)
        VALUES (?, ?, ?, 'pending', 0, ?, ?)
        "#,
    )
    .bind(event.kind())
    .bind(event.aggregate_id())
    .bind(payload)
    .bind(now.timestamp_millis())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Delay before the next attempt, doubling per attempt up to `max_backoff`.
pub fn backoff_delay(config: &OutboxConfig, attempts: i64) -> Duration {
    let exponent = (attempts.max(1) - 1).min(20) as u32;
    config
        .base_backoff
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(config.max_backoff)
}

pub struct OutboxManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OutboxManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<OutboxEntry>> {
        let entry = sqlx::query_as::<_, OutboxEntry>(&format!(
            "SELECT {} FROM outbox WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn list(&self, status: Option<&str>, limit: i64) -> Result<Vec<OutboxEntry>> {
        let entries = match status {
            Some(status) => {
                sqlx::query_as::<_, OutboxEntry>(&format!(
                    "SELECT {} FROM outbox WHERE status = ? ORDER BY id LIMIT ?",
                    ENTRY_COLUMNS
                ))
                .bind(status)
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            },
            None => {
                sqlx::query_as::<_, OutboxEntry>(&format!(
                    "SELECT {} FROM outbox ORDER BY id LIMIT ?",
                    ENTRY_COLUMNS
                ))
                .bind(limit)
                .fetch_all(self.pool)
                .await?
            },
        };
        Ok(entries)
    }

    pub async fn stats(&self) -> Result<OutboxStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM outbox GROUP BY status")
                .fetch_all(self.pool)
                .await?;

        let mut stats = OutboxStats::default();
        for (status, count) in rows {
            match status.as_str() {
                STATUS_PENDING => stats.pending = count,
                STATUS_DONE => stats.done = count,
                STATUS_FAILED => stats.failed = count,
                _ => {},
            }
        }
        Ok(stats)
    }

    /// Whether `aggregate_id` still has undelivered work of `kind`.
    pub async fn has_pending(&self, aggregate_id: &str, kind: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox WHERE aggregate_id = ? AND kind = ? AND status = 'pending'",
        )
        .bind(aggregate_id)
        .bind(kind)
        .fetch_one(self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Due pending entries, oldest first.
    pub async fn due(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            r#"
            SELECT {} FROM outbox
            WHERE status = 'pending' AND next_attempt_at <= ?
            ORDER BY id
            LIMIT ?
            "#,
            ENTRY_COLUMNS
        ))
        .bind(Utc::now().timestamp_millis())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }

    /// Lease a due entry. Returns false when someone else holds it.
    pub async fn claim(&self, id: i64) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE outbox SET next_attempt_at = ?
            WHERE id = ? AND status = 'pending' AND next_attempt_at <= ?
            "#,
        )
        .bind(now + CLAIM_LEASE.as_millis() as i64)
        .bind(id)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_done(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET status = 'done', last_error = NULL, processed_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt; schedules a retry or gives up.
    /// Returns the new status.
    pub async fn record_failure(
        &self,
        entry: &OutboxEntry,
        error: &str,
        config: &OutboxConfig,
    ) -> Result<&'static str> {
        let attempts = entry.attempts + 1;
        let (status, next_attempt_at) = if attempts >= config.max_attempts {
            (STATUS_FAILED, Utc::now().timestamp_millis())
        } else {
            let delay = backoff_delay(config, attempts);
            (
                STATUS_PENDING,
                Utc::now().timestamp_millis() + delay.as_millis() as i64,
            )
        };

        sqlx::query(
            r#"
            UPDATE outbox SET status = ?, attempts = ?, last_error = ?, next_attempt_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(attempts)
        .bind(error)
        .bind(next_attempt_at)
        .bind(entry.id)
        .execute(self.pool)
        .await?;

        Ok(status)
    }

    /// Move failed entries back to pending, due now. Returns how many.
    pub async fn retry_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE outbox SET status = 'pending', attempts = 0, next_attempt_at = ? WHERE status = 'failed'",
        )
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub delivered: usize,
    pub retrying: usize,
    pub failed: usize,
}

/// Applies outbox entries to task stores.
#[derive(Clone)]
pub struct OutboxDispatcher {
    resolver: TaskStoreResolver,
    config: OutboxConfig,
}

impl OutboxDispatcher {
    pub fn new(resolver: TaskStoreResolver, config: OutboxConfig) -> Self {
        Self { resolver, config }
    }

    fn meta(&self) -> &SqlitePool {
        self.resolver.meta()
    }

    /// Deliver up to `limit` due entries.
    pub async fn process_pending(&self, limit: i64) -> Result<DispatchSummary> {
        let outbox = OutboxManager::new(self.meta());
        let mut summary = DispatchSummary::default();

        for entry in outbox.due(limit).await? {
            if !outbox.claim(entry.id).await? {
                continue;
            }
            summary.processed += 1;
            match self.deliver_claimed(&entry).await? {
                STATUS_DONE => summary.delivered += 1,
                STATUS_FAILED => summary.failed += 1,
                _ => summary.retrying += 1,
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                processed = summary.processed,
                delivered = summary.delivered,
                retrying = summary.retrying,
                failed = summary.failed,
                "Outbox batch dispatched"
            );
        }
        Ok(summary)
    }

    /// Deliver one entry right away if it is still pending and due. Used on
    /// the request path so the common case returns already mirrored.
    pub async fn deliver_now(&self, id: i64) -> Result<Option<&'static str>> {
        let outbox = OutboxManager::new(self.meta());
        if !outbox.claim(id).await? {
            return Ok(None);
        }
        let Some(entry) = outbox.get(id).await? else {
            return Ok(None);
        };
        self.deliver_claimed(&entry).await.map(Some)
    }

    async fn deliver_claimed(&self, entry: &OutboxEntry) -> Result<&'static str> {
        let outbox = OutboxManager::new(self.meta());

        let outcome = match serde_json::from_str::<OutboxEvent>(&entry.payload) {
            Ok(event) => self.apply(&event).await,
            Err(e) => Err(BridgeError::InvalidInput(format!(
                "Undecodable outbox payload: {}",
                e
            ))),
        };

        match outcome {
            Ok(()) => {
                outbox.mark_done(entry.id).await?;
                tracing::debug!(entry_id = entry.id, kind = %entry.kind, "Outbox entry delivered");
                Ok(STATUS_DONE)
            },
            Err(e) => {
                let status = outbox
                    .record_failure(entry, &e.to_string(), &self.config)
                    .await?;
                if status == STATUS_FAILED {
                    tracing::error!(entry_id = entry.id, kind = %entry.kind, error = %e, "Outbox entry failed permanently");
                } else {
                    tracing::warn!(entry_id = entry.id, kind = %entry.kind, error = %e, "Outbox delivery failed, will retry");
                }
                Ok(status)
            },
        }
    }

    async fn apply(&self, event: &OutboxEvent) -> Result<()> {
        let bridge = ProjectBridge::new(self.meta());

        match event {
            OutboxEvent::ProjectMirror {
                meta_project_id, ..
            } => {
                let Some(project) = bridge.find_by_meta_id(meta_project_id).await? else {
                    tracing::debug!(meta_project_id, "Project deleted before mirroring, skipping");
                    return Ok(());
                };
                if project.custom_db_project_id.is_some() {
                    return Ok(());
                }

                let target = self
                    .resolver
                    .target_for_project(project.organization_id.as_deref(), &project.owner_id)
                    .await?;
                let store = self.resolver.open_strict(&target).await?;

                let mirror = MirrorManager::new(&store.pool)
                    .create_mirror(
                        &project.id,
                        &project.name,
                        project.organization_id.as_deref(),
                    )
                    .await?;
                bridge.link(&project.id, &mirror.id).await?;

                tracing::info!(meta_project_id, store_project_id = %mirror.id, store = %target, "Project mirrored");
                Ok(())
            },
            OutboxEvent::ProjectRename {
                meta_project_id,
                name,
            } => {
                let Some(project) = bridge.find_by_meta_id(meta_project_id).await? else {
                    return Ok(());
                };
                let Some(store_id) = project.custom_db_project_id.as_deref() else {
                    // The pending mirror entry will pick up the current name
                    return Ok(());
                };

                let target = self
                    .resolver
                    .target_for_project(project.organization_id.as_deref(), &project.owner_id)
                    .await?;
                let store = self.resolver.open_strict(&target).await?;
                MirrorManager::new(&store.pool)
                    .rename_mirror(store_id, name)
                    .await?;
                Ok(())
            },
            OutboxEvent::ProjectDelete {
                meta_project_id,
                store_project_id,
                organization_id,
                owner_id,
            } => {
                let target = self
                    .resolver
                    .target_for_project(organization_id.as_deref(), owner_id)
                    .await?;
                let store = self.resolver.open_strict(&target).await?;
                let mirrors = MirrorManager::new(&store.pool);

                let store_id = match store_project_id {
                    Some(id) => Some(id.clone()),
                    None => mirrors
                        .find_by_meta_id(meta_project_id)
                        .await?
                        .map(|m| m.id),
                };

                if let Some(store_id) = store_id {
                    mirrors.delete_mirror(&store_id).await?;
                    tracing::info!(meta_project_id, store_project_id = %store_id, "Project mirror deleted");
                }
                Ok(())
            },
        }
    }

    /// Drain the outbox on an interval until `shutdown` flips to true.
    pub fn spawn_worker(
        self,
        interval: Duration,
        batch_size: i64,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.process_pending(batch_size).await {
                            tracing::error!(error = %e, "Outbox worker iteration failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("Outbox worker stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
