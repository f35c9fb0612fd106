//! Connection resolver: maps a store target to a cached, migrated pool.
//!
//! The registry only knows locations. Deciding *which* target a request
//! belongs to is the job of [`crate::routing`].

use crate::db::{create_pool, run_store_migrations};
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Which physical task store a piece of data lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StoreTarget {
    Organization(String),
    User(String),
    Admin,
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Organization(id) => write!(f, "org:{}", id),
            StoreTarget::User(id) => write!(f, "user:{}", id),
            StoreTarget::Admin => write!(f, "admin"),
        }
    }
}

/// An open task store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    pub target: StoreTarget,
    pub pool: SqlitePool,
}

struct CachedStore {
    handle: StoreHandle,
    location: PathBuf,
    last_used_ms: Arc<AtomicI64>,
}

impl CachedStore {
    fn touch(&self) {
        self.last_used_ms.store(now_ms(), Ordering::Relaxed);
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Accepts `sqlite://path`, `sqlite:path` or a bare filesystem path.
pub fn parse_database_url(url: &str) -> Result<PathBuf> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        return Err(BridgeError::InvalidInput(format!(
            "Unsupported database URL scheme: '{}'",
            url
        )));
    } else {
        url
    };

    if path.is_empty() {
        return Err(BridgeError::InvalidInput(
            "Database URL has an empty path".into(),
        ));
    }

    Ok(PathBuf::from(path))
}

/// Location of an organization store. Relative paths live under `data_dir`
/// so every process opens the same file whatever its working directory.
pub fn resolve_database_url(url: &str, data_dir: &Path) -> Result<PathBuf> {
    let path = parse_database_url(url)?;
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(data_dir.join(path))
    }
}

/// Cache of open task stores keyed by target.
pub struct StoreRegistry {
    stores: RwLock<HashMap<StoreTarget, CachedStore>>,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `target`, opening and migrating the
    /// database at `location` on first use. A cached handle whose location
    /// changed is closed and reopened.
    pub async fn get_or_open(&self, target: &StoreTarget, location: &Path) -> Result<StoreHandle> {
        {
            let stores = self.stores.read().await;
            if let Some(cached) = stores.get(target) {
                if cached.location == location {
                    cached.touch();
                    return Ok(cached.handle.clone());
                }
            }
        }

        let mut stores = self.stores.write().await;

        // Another request may have opened it while we waited for the lock
        if let Some(cached) = stores.get(target) {
            if cached.location == location {
                cached.touch();
                return Ok(cached.handle.clone());
            }
        }

        if let Some(stale) = stores.remove(target) {
            tracing::info!(store = %target, old = %stale.location.display(), "Store location changed, reopening");
            stale.handle.pool.close().await;
        }

        let pool = open_store(location)
            .await
            .map_err(|e| BridgeError::StoreUnavailable {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(store = %target, location = %location.display(), "Opened task store");

        let handle = StoreHandle {
            target: target.clone(),
            pool,
        };
        stores.insert(
            target.clone(),
            CachedStore {
                handle: handle.clone(),
                location: location.to_path_buf(),
                last_used_ms: Arc::new(AtomicI64::new(now_ms())),
            },
        );

        Ok(handle)
    }

    /// Close handles idle for longer than `ttl`. Returns how many were closed.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let cutoff = now_ms() - ttl.as_millis() as i64;
        let mut stores = self.stores.write().await;

        let expired: Vec<StoreTarget> = stores
            .iter()
            .filter(|(_, cached)| cached.last_used_ms.load(Ordering::Relaxed) < cutoff)
            .map(|(target, _)| target.clone())
            .collect();

        for target in &expired {
            if let Some(cached) = stores.remove(target) {
                cached.handle.pool.close().await;
                tracing::debug!(store = %target, "Evicted idle task store");
            }
        }

        expired.len()
    }

    pub async fn invalidate(&self, target: &StoreTarget) {
        if let Some(cached) = self.stores.write().await.remove(target) {
            cached.handle.pool.close().await;
        }
    }

    pub async fn cached_targets(&self) -> Vec<StoreTarget> {
        self.stores.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.stores.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stores.read().await.is_empty()
    }

    pub async fn close_all(&self) {
        let mut stores = self.stores.write().await;
        for (_, cached) in stores.drain() {
            cached.handle.pool.close().await;
        }
    }
}

async fn open_store(location: &Path) -> Result<SqlitePool> {
    let pool = create_pool(location).await?;
    run_store_migrations(&pool).await?;
    Ok(pool)
}
