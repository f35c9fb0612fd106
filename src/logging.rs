//! Logging setup.
//!
//! Structured logging through `tracing`. The CLI logs to stderr so that
//! command output on stdout stays machine-readable; the server can log to a
//! daily-rotated file under the data directory.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub color: bool,
    pub show_timestamps: bool,
    pub show_target: bool,
    /// JSON lines for machine parsing
    pub json_format: bool,
    pub enable_spans: bool,
    /// Log to this file (rotated daily) instead of stderr
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            color: true,
            show_timestamps: false,
            show_target: false,
            json_format: false,
            enable_spans: false,
            file_output: None,
        }
    }
}

impl LoggingConfig {
    pub fn for_mode(mode: ApplicationMode) -> Self {
        match mode {
            ApplicationMode::Server => Self {
                level: Level::INFO,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
            ApplicationMode::Cli => Self {
                level: Level::WARN,
                color: io::stderr().is_terminal(),
                ..Self::default()
            },
            ApplicationMode::Test => Self {
                level: Level::DEBUG,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
        }
    }

    /// Build from the global CLI flags.
    pub fn from_args(quiet: bool, verbose: u8, json: bool) -> Self {
        let level = if quiet {
            Level::ERROR
        } else {
            match verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };

        Self {
            level,
            color: !quiet && !json && io::stderr().is_terminal(),
            show_timestamps: verbose > 0 || json,
            show_target: verbose > 1,
            json_format: json,
            enable_spans: verbose > 1,
            file_output: None,
        }
    }

    /// Apply `TASKBRIDGE_LOG_LEVEL`, `TASKBRIDGE_LOG_JSON` and
    /// `TASKBRIDGE_LOG_FILE` on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("TASKBRIDGE_LOG_LEVEL") {
            if let Some(level) = parse_level(&level) {
                self.level = level;
            }
        }
        if std::env::var("TASKBRIDGE_LOG_JSON").as_deref() == Ok("true") {
            self.json_format = true;
            self.color = false;
        }
        if let Ok(path) = std::env::var("TASKBRIDGE_LOG_FILE") {
            if !path.trim().is_empty() {
                self.file_output = Some(PathBuf::from(path));
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// Long-running HTTP server
    Server,
    Cli,
    Test,
}

fn parse_level(raw: &str) -> Option<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn already_set(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, e.to_string())
}

/// Install the global subscriber. `RUST_LOG` wins over `config.level`.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taskbridge={}", config.level)));

    let registry = Registry::default().with(env_filter);

    if let Some(log_file) = config.file_output {
        let dir = log_file
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path"))?;
        let name = log_file
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name"))?;
        std::fs::create_dir_all(dir)?;
        let file_appender = tracing_appender::rolling::daily(dir, name);

        if config.json_format {
            fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
                .map_err(already_set)?;
        } else {
            fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
                .map_err(already_set)?;
        }
    } else if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr)
            .with_subscriber(registry)
            .try_init()
            .map_err(already_set)?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_writer(io::stderr);

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .try_init()
                .map_err(already_set)?;
        } else {
            fmt_layer
                .without_time()
                .with_subscriber(registry)
                .try_init()
                .map_err(already_set)?;
        }
    }

    Ok(())
}

/// Remove rotated log files (`*.log.YYYY-MM-DD`) older than `retention_days`.
/// Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> io::Result<usize> {
    use std::fs;
    use std::time::{Duration, SystemTime};

    if !log_dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        if !name.is_some_and(|n| n.contains(".log.")) || !path.is_file() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age <= retention {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                tracing::info!(path = %path.display(), age_days = age.as_secs() / 86400, "Removed old log file");
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove old log file");
            },
        }
    }

    Ok(removed)
}

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Log file for `mode` under `data_dir/logs`.
pub fn log_file_path(data_dir: &Path, mode: ApplicationMode) -> PathBuf {
    let dir = log_dir(data_dir);
    match mode {
        ApplicationMode::Server => dir.join("server.log"),
        ApplicationMode::Cli => dir.join("cli.log"),
        ApplicationMode::Test => dir.join("test.log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_from_args_levels() {
        assert_eq!(LoggingConfig::from_args(false, 0, false).level, Level::WARN);
        assert_eq!(LoggingConfig::from_args(false, 1, false).level, Level::INFO);
        assert_eq!(LoggingConfig::from_args(false, 2, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_args(true, 3, false).level, Level::ERROR);

        let json = LoggingConfig::from_args(false, 0, true);
        assert!(json.json_format);
        assert!(!json.color);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("TASKBRIDGE_LOG_LEVEL", "debug");
        std::env::set_var("TASKBRIDGE_LOG_JSON", "true");
        std::env::set_var("TASKBRIDGE_LOG_FILE", "/tmp/taskbridge-test.log");

        let config = LoggingConfig::for_mode(ApplicationMode::Cli).with_env_overrides();

        std::env::remove_var("TASKBRIDGE_LOG_LEVEL");
        std::env::remove_var("TASKBRIDGE_LOG_JSON");
        std::env::remove_var("TASKBRIDGE_LOG_FILE");

        assert_eq!(config.level, Level::DEBUG);
        assert!(config.json_format);
        assert_eq!(
            config.file_output,
            Some(PathBuf::from("/tmp/taskbridge-test.log"))
        );
    }

    #[test]
    fn test_unknown_level_is_ignored() {
        assert_eq!(parse_level("LOUD"), None);
        assert_eq!(parse_level(" Info "), Some(Level::INFO));
    }

    #[test]
    fn test_log_file_path() {
        let path = log_file_path(Path::new("/data"), ApplicationMode::Server);
        assert_eq!(path, PathBuf::from("/data/logs/server.log"));
    }

    #[test]
    fn test_cleanup_keeps_fresh_and_unrotated_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("server.log"), b"current").unwrap();
        std::fs::write(dir.path().join("server.log.2026-01-01"), b"rotated").unwrap();

        // Both files are brand new, so nothing is old enough
        assert_eq!(cleanup_old_logs(dir.path(), 7).unwrap(), 0);
        assert!(dir.path().join("server.log.2026-01-01").exists());

        assert_eq!(cleanup_old_logs(&dir.path().join("missing"), 7).unwrap(), 0);
    }
}
