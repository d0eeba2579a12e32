//! Configuration for the partitioned store

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default number of partitions
pub const DEFAULT_PARTITIONS: usize = 10;

/// Default capacity of each partition's write queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// How identifier/label associations are laid out on disk.
///
/// The two layouts are not interchangeable on the same data. A store records
/// its layout in its manifest and refuses to reopen with the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyLayout {
    /// One row per (identifier, label) pair: key = identifier ++ label, empty value
    #[default]
    Association,
    /// One row per identifier whose value is the comma-joined label list
    Joined,
}

impl KeyLayout {
    /// Lowercase name as written to the manifest
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Association => "association",
            Self::Joined => "joined",
        }
    }
}

impl fmt::Display for KeyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durability requested for a single write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Write-ahead log is synced before the write is acknowledged
    Synced,
    /// Write-ahead log is written but not synced
    #[default]
    Relaxed,
}

/// Configuration for a [`PartitionedStore`](crate::PartitionedStore)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base path; partition `i` lives at `<base_path>.<i>`
    pub base_path: PathBuf,

    /// Number of partitions, fixed for the store's on-disk lifetime
    pub partitions: usize,

    /// Bounded capacity of each partition's write queue
    pub queue_capacity: usize,

    /// Key layout used by every write and read
    pub layout: KeyLayout,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("labelsdb/db"),
            partitions: DEFAULT_PARTITIONS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            layout: KeyLayout::Association,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with the given base path and defaults otherwise
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the partition count
    #[must_use]
    pub const fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Set the per-partition queue capacity
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the key layout
    #[must_use]
    pub const fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    /// On-disk directory of partition `index`
    pub fn partition_path(&self, index: usize) -> PathBuf {
        let mut name = self.base_path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    /// Location of the manifest recording partition count and layout
    pub fn manifest_path(&self) -> PathBuf {
        let mut name = self.base_path.clone().into_os_string();
        name.push(".manifest.json");
        PathBuf::from(name)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(StoreError::InvalidConfig(
                "partition count must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.base_path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "base path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Host-detected scan parallelism, used when a caller does not choose one
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.partitions, 10);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.layout, KeyLayout::Association);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partition_paths() {
        let config = StoreConfig::new("labelsdb/db");
        assert_eq!(config.partition_path(0), PathBuf::from("labelsdb/db.0"));
        assert_eq!(config.partition_path(9), PathBuf::from("labelsdb/db.9"));
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("labelsdb/db.manifest.json")
        );
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = StoreConfig::new("db").with_partitions(0);
        assert!(matches!(config.validate(), Err(StoreError::InvalidConfig(_))));

        let config = StoreConfig::new("db").with_queue_capacity(0);
        assert!(matches!(config.validate(), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_layout_serde_names() {
        assert_eq!(
            serde_json::to_string(&KeyLayout::Joined).unwrap(),
            "\"joined\""
        );
        assert_eq!(KeyLayout::Association.to_string(), "association");
    }

    #[test]
    fn test_default_parallelism_positive() {
        assert!(default_parallelism() >= 1);
    }
}
