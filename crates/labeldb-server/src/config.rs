//! Server configuration management.
//!
//! Configuration is read from CLI arguments with environment variable
//! fallbacks and validated before the store is opened.
//!
//! # Configuration Sources
//!
//! - CLI arguments (`--http-bind`, `--db-path`, `--partitions`, etc.)
//! - Environment variables (`LABELDB_HTTP_BIND`, `LABELDB_DB_PATH`, etc.)
//! - Default values
//!
//! # Example
//!
//! ```no_run
//! use labeldb_server::ServerConfig;
//!
//! let config = ServerConfig::from_args();
//! config.validate().expect("Invalid configuration");
//!
//! println!("HTTP server will bind to: {}", config.http_bind);
//! println!("Store lives at: {}", config.db_path.display());
//! ```

use crate::error::ConfigError;
use clap::{Parser, ValueEnum};
use labeldb_store::config::{DEFAULT_PARTITIONS, DEFAULT_QUEUE_CAPACITY};
use labeldb_store::{Durability, KeyLayout, MAX_SCAN_WORKERS, StoreConfig, default_parallelism};
use std::net::SocketAddr;
use std::path::PathBuf;

/// On-disk association layout selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LayoutArg {
    /// One row per identifier and label pair
    #[default]
    Association,
    /// One row per identifier holding the comma-joined labels
    Joined,
}

impl From<LayoutArg> for KeyLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Association => Self::Association,
            LayoutArg::Joined => Self::Joined,
        }
    }
}

/// Server configuration loaded from CLI args and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "labeldb",
    about = "Bulk-load identifier files and look up their labels over HTTP",
    version
)]
pub struct ServerConfig {
    /// HTTP bind address
    #[arg(long, env = "LABELDB_HTTP_BIND", default_value = "0.0.0.0:8080")]
    pub http_bind: SocketAddr,

    /// Base path of the partitioned store
    #[arg(long, env = "LABELDB_DB_PATH", default_value = "labelsdb/db")]
    pub db_path: PathBuf,

    /// Number of partitions (fixed for the lifetime of the data)
    #[arg(long, env = "LABELDB_PARTITIONS", default_value_t = DEFAULT_PARTITIONS)]
    pub partitions: usize,

    /// Capacity of each partition's write queue
    #[arg(long, env = "LABELDB_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Default scan workers per load (host parallelism when unset, at most 1024)
    #[arg(long, env = "LABELDB_WORKERS")]
    pub workers: Option<usize>,

    /// Association layout on disk
    #[arg(long, env = "LABELDB_LAYOUT", value_enum, default_value_t = LayoutArg::Association)]
    pub layout: LayoutArg,

    /// Directory that load requests resolve file names against
    #[arg(long, env = "LABELDB_LOAD_ROOT", default_value = ".")]
    pub load_root: PathBuf,

    /// Sync the write-ahead log on every loaded write
    #[arg(long, env = "LABELDB_SYNCED_WRITES")]
    pub synced_writes: bool,
}

impl ServerConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Configuration with defaults for everything except the store path.
    #[must_use]
    pub fn for_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            http_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: db_path.into(),
            partitions: DEFAULT_PARTITIONS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: None,
            layout: LayoutArg::Association,
            load_root: PathBuf::from("."),
            synced_writes: false,
        }
    }

    /// Store configuration derived from these settings.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.db_path)
            .with_partitions(self.partitions)
            .with_queue_capacity(self.queue_capacity)
            .with_layout(self.layout.into())
    }

    /// Scan workers used when a request does not ask for a specific count.
    #[must_use]
    pub fn default_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| default_parallelism().min(MAX_SCAN_WORKERS))
    }

    /// Durability applied to loaded writes.
    #[must_use]
    pub const fn durability(&self) -> Durability {
        if self.synced_writes {
            Durability::Synced
        } else {
            Durability::Relaxed
        }
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - partition count, queue capacity or worker count is zero
    /// - worker count exceeds [`MAX_SCAN_WORKERS`]
    /// - the load root is not an existing directory
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions == 0 {
            return Err(ConfigError::InvalidValue {
                name: "partitions",
                reason: "must be positive".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "queue-capacity",
                reason: "must be positive".to_string(),
            });
        }
        if let Some(workers) = self.workers {
            check_workers(workers).map_err(|reason| ConfigError::InvalidValue {
                name: "workers",
                reason,
            })?;
        }
        if !self.load_root.is_dir() {
            return Err(ConfigError::MissingRequired(format!(
                "load root is not a directory: {}",
                self.load_root.display()
            )));
        }

        Ok(())
    }
}

/// Check a requested scan worker count against `1..=MAX_SCAN_WORKERS`.
///
/// # Errors
///
/// Returns the reason the count is out of range.
pub fn check_workers(workers: usize) -> Result<(), String> {
    if workers == 0 {
        Err("must be positive".to_string())
    } else if workers > MAX_SCAN_WORKERS {
        Err(format!("must be at most {MAX_SCAN_WORKERS}"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_defaults() {
        let config = ServerConfig::try_parse_from(["labeldb"]).unwrap();
        assert_eq!(config.http_bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.db_path, PathBuf::from("labelsdb/db"));
        assert_eq!(config.partitions, 10);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.layout, LayoutArg::Association);
        assert!(!config.synced_writes);
    }

    #[test]
    fn test_parse_overrides() {
        let config = ServerConfig::try_parse_from([
            "labeldb",
            "--partitions",
            "4",
            "--layout",
            "joined",
            "--workers",
            "2",
            "--synced-writes",
        ])
        .unwrap();

        let store = config.store_config();
        assert_eq!(store.partitions, 4);
        assert_eq!(store.layout, KeyLayout::Joined);
        assert_eq!(config.default_workers(), 2);
        assert_eq!(config.durability(), Durability::Synced);
    }

    #[test]
    fn test_validate_rejects_zero_partitions() {
        let dir = TempDir::new().unwrap();
        let mut config = ServerConfig::for_db_path(dir.path().join("db"));
        config.load_root = dir.path().to_path_buf();
        assert!(config.validate().is_ok());

        config.partitions = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name: "partitions", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_load_root() {
        let mut config = ServerConfig::for_db_path("db");
        config.load_root = PathBuf::from("/nonexistent/labeldb/root");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_workers() {
        let dir = TempDir::new().unwrap();
        let mut config = ServerConfig::for_db_path(dir.path().join("db"));
        config.load_root = dir.path().to_path_buf();

        config.workers = Some(MAX_SCAN_WORKERS);
        assert!(config.validate().is_ok());

        for workers in [0, MAX_SCAN_WORKERS + 1, usize::MAX] {
            config.workers = Some(workers);
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidValue { name: "workers", .. })
                ),
                "workers = {workers}"
            );
        }
    }
}
