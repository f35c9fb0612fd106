use crate::error::{BridgeError, Result};
use std::path::PathBuf;
use std::time::Duration;

const DATA_DIR_NAME: &str = ".taskbridge";
const METADATA_DB_FILE: &str = "metadata.db";
const ADMIN_DB_FILE: &str = "admin.db";
const USERS_DIR: &str = "users";

/// Runtime configuration.
///
/// Read from environment variables, then overridden by CLI flags:
///   TASKBRIDGE_DATA_DIR: root of all databases, defaults to ~/.taskbridge
///   TASKBRIDGE_HOST: bind address, defaults to 127.0.0.1
///   TASKBRIDGE_PORT: bind port, defaults to 3030
///   TASKBRIDGE_CACHE_TTL_SECS: idle time before a store handle is closed
///   TASKBRIDGE_ADMIN_FALLBACK: degrade to the admin store when an org store is down
///   TASKBRIDGE_OUTBOX_MAX_ATTEMPTS: attempts before an outbox entry is marked failed
///   TASKBRIDGE_OUTBOX_INTERVAL_MS: background outbox poll interval
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub cache_ttl: Duration,
    pub admin_fallback: bool,
    pub outbox: OutboxConfig,
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub max_attempts: i64,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            poll_interval: Duration::from_millis(2000),
            batch_size: 50,
        }
    }
}

impl BridgeConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            host: "127.0.0.1".into(),
            port: 3030,
            cache_ttl: Duration::from_secs(600),
            admin_fallback: true,
            outbox: OutboxConfig::default(),
        }
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(DATA_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
    }

    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("TASKBRIDGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_data_dir());

        let mut config = Self::with_data_dir(data_dir);

        if let Ok(host) = std::env::var("TASKBRIDGE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_env::<u16>("TASKBRIDGE_PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse_env::<u64>("TASKBRIDGE_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(fallback) = parse_env::<bool>("TASKBRIDGE_ADMIN_FALLBACK")? {
            config.admin_fallback = fallback;
        }
        if let Some(attempts) = parse_env::<i64>("TASKBRIDGE_OUTBOX_MAX_ATTEMPTS")? {
            if attempts < 1 {
                return Err(BridgeError::InvalidInput(
                    "TASKBRIDGE_OUTBOX_MAX_ATTEMPTS must be at least 1".into(),
                ));
            }
            config.outbox.max_attempts = attempts;
        }
        if let Some(ms) = parse_env::<u64>("TASKBRIDGE_OUTBOX_INTERVAL_MS")? {
            config.outbox.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_DB_FILE)
    }

    pub fn admin_db_path(&self) -> PathBuf {
        self.data_dir.join(ADMIN_DB_FILE)
    }

    pub fn user_db_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(USERS_DIR).join(format!("{}.db", user_id))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| BridgeError::InvalidInput(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
