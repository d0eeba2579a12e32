//! Bulk loading of identifier files under a label.

use crate::codec::{association_key, encode_identifier};
use crate::config::{Durability, KeyLayout, default_parallelism};
use crate::error::{Result, StoreError};
use crate::splitter::LineSplitter;
use crate::store::{APPEND_SEPARATOR, IngestOp, PartitionedStore};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Options for a single load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Number of byte ranges scanned concurrently
    pub parallelism: usize,
    /// Parse and route every line but write nothing (dry run)
    pub skip_write: bool,
    /// Durability of each queued write
    pub durability: Durability,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            skip_write: false,
            durability: Durability::Relaxed,
        }
    }
}

impl LoadOptions {
    /// Set scan parallelism
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Enable or disable dry-run mode
    #[must_use]
    pub const fn with_skip_write(mut self, skip_write: bool) -> Self {
        self.skip_write = skip_write;
        self
    }

    /// Set write durability
    #[must_use]
    pub const fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

/// Outcome of a successful load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Non-empty lines accepted
    pub lines: u64,
    /// Wall-clock time of the load
    pub elapsed: Duration,
}

/// Check that `label` can be stored under `layout`.
pub fn validate_label(label: &[u8], layout: KeyLayout) -> Result<()> {
    if label.is_empty() {
        return Err(StoreError::InvalidLabel {
            reason: "label must not be empty".to_string(),
        });
    }
    if layout == KeyLayout::Joined && label.contains(&APPEND_SEPARATOR) {
        return Err(StoreError::InvalidLabel {
            reason: format!(
                "label must not contain '{}' in the joined layout",
                char::from(APPEND_SEPARATOR)
            ),
        });
    }
    Ok(())
}

/// Loads identifier files into a [`PartitionedStore`].
///
/// A line that is not a valid identifier aborts the whole load; rows queued
/// before the failure are kept.
#[derive(Debug, Clone)]
pub struct LabelLoader {
    store: Arc<PartitionedStore>,
}

impl LabelLoader {
    /// Create a loader writing to `store`
    pub const fn new(store: Arc<PartitionedStore>) -> Self {
        Self { store }
    }

    /// Associate every non-empty line of `path` with `label`.
    ///
    /// Blocks until every accepted line has been applied by its partition
    /// writer (unless `skip_write` is set), so a lookup issued after this
    /// returns sees the whole file.
    pub fn load_file(
        &self,
        path: &Path,
        label: &[u8],
        options: &LoadOptions,
    ) -> Result<LoadReport> {
        let layout = self.store.layout();
        validate_label(label, layout)?;

        let start = Instant::now();
        info!(
            "Start loading {:?} with label {} ({} workers{})",
            path,
            String::from_utf8_lossy(label),
            options.parallelism.max(1),
            if options.skip_write { ", dry run" } else { "" }
        );

        let splitter = LineSplitter::new(options.parallelism);
        let lines = splitter.scan(path, |line| {
            self.ingest_line(line, label, layout, options)
                .map_err(|e| StoreError::Line {
                    path: path.to_path_buf(),
                    source: Box::new(e),
                })
        })?;

        if !options.skip_write {
            self.store.flush()?;
        }

        let elapsed = start.elapsed();
        info!(
            "Loaded {:?} with label {}: {} lines in {:?}",
            path,
            String::from_utf8_lossy(label),
            lines,
            elapsed
        );

        Ok(LoadReport { lines, elapsed })
    }

    fn ingest_line(
        &self,
        line: &[u8],
        label: &[u8],
        layout: KeyLayout,
        options: &LoadOptions,
    ) -> Result<()> {
        let identifier = encode_identifier(line)?;
        let partition = self.store.partition_of(&identifier);
        if options.skip_write {
            return Ok(());
        }

        let op = match layout {
            KeyLayout::Association => {
                IngestOp::set(association_key(&identifier, label), Vec::new())
            }
            KeyLayout::Joined => IngestOp::append(identifier, label),
        };
        self.store.enqueue(partition, op.with_durability(options.durability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label() {
        assert!(validate_label(b"label2", KeyLayout::Association).is_ok());
        assert!(validate_label(b"a,b", KeyLayout::Association).is_ok());
        assert!(matches!(
            validate_label(b"", KeyLayout::Association),
            Err(StoreError::InvalidLabel { .. })
        ));
        assert!(matches!(
            validate_label(b"a,b", KeyLayout::Joined),
            Err(StoreError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn test_options_builder() {
        let options = LoadOptions::default()
            .with_parallelism(4)
            .with_skip_write(true)
            .with_durability(Durability::Synced);
        assert_eq!(options.parallelism, 4);
        assert!(options.skip_write);
        assert_eq!(options.durability, Durability::Synced);
    }
}
