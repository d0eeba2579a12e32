//! Partitioned, persistent, ordered key-value store.
//!
//! Each of the P partitions is an independent RocksDB instance with exactly
//! one writer thread consuming a bounded queue. The single consumer is what
//! serializes writes to a partition, including the read-modify-write of
//! [`IngestOp::Append`]. Reads go straight to the engine and may observe any
//! prefix of a partition's applied writes.
//!
//! ```no_run
//! use labeldb_store::{IngestOp, PartitionedStore, StoreConfig};
//!
//! # fn main() -> labeldb_store::Result<()> {
//! let store = PartitionedStore::open(StoreConfig::new("labelsdb/db"))?;
//! let partition = store.partition_of(b"key");
//! store.enqueue(partition, IngestOp::set(b"key".to_vec(), Vec::new()))?;
//! store.flush()?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

mod manifest;
mod partition;

pub use partition::{APPEND_SEPARATOR, IngestOp, PartitionStats};

use crate::config::{KeyLayout, StoreConfig};
use crate::error::{Result, StoreError};
use crate::router;
use partition::Partition;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Exclusive upper bound of the key range sharing `prefix`.
///
/// Increments `prefix` as a big-endian integer, carrying through trailing
/// `0xff` bytes, and truncates after the incremented byte. Returns `None`
/// (no upper bound) when the prefix is empty or all `0xff`.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let position = prefix.iter().rposition(|&byte| byte != 0xff)?;
    let mut upper = prefix[..=position].to_vec();
    upper[position] += 1;
    Some(upper)
}

/// Store-wide counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Key layout of the store
    pub layout: KeyLayout,
    /// Per-partition counters, in partition order
    pub partitions: Vec<PartitionStats>,
}

impl StoreStats {
    /// Total ops applied across partitions
    pub fn applied(&self) -> u64 {
        self.partitions.iter().map(|p| p.applied).sum()
    }

    /// Total failed or skipped ops across partitions
    pub fn failed(&self) -> u64 {
        self.partitions.iter().map(|p| p.failed).sum()
    }
}

/// P independent ordered partitions with serialized per-partition writes
pub struct PartitionedStore {
    config: StoreConfig,
    partitions: Vec<Partition>,
    closed: AtomicBool,
}

impl std::fmt::Debug for PartitionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedStore")
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PartitionedStore {
    /// Open every partition and start its writer.
    ///
    /// Fails fast if any partition cannot be opened; partitions opened before
    /// the failure are drained and closed first.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        manifest::check_or_create(&config)?;

        info!(
            "Opening store at {:?} with {} partitions ({} layout)",
            config.base_path, config.partitions, config.layout
        );

        let mut partitions = Vec::with_capacity(config.partitions);
        for index in 0..config.partitions {
            match Partition::open(index, &config.partition_path(index), config.queue_capacity) {
                Ok(partition) => partitions.push(partition),
                Err(e) => {
                    for partition in &partitions {
                        for close_error in partition.close() {
                            warn!("Error closing partition after failed open: {}", close_error);
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            config,
            partitions,
            closed: AtomicBool::new(false),
        })
    }

    /// Configuration the store was opened with
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Key layout of this store
    pub const fn layout(&self) -> KeyLayout {
        self.config.layout
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition responsible for `key`
    pub fn partition_of(&self, key: &[u8]) -> usize {
        router::partition_of(key, self.partitions.len())
    }

    fn partition(&self, index: usize) -> Result<&Partition> {
        self.partitions
            .get(index)
            .ok_or(StoreError::UnknownPartition {
                partition: index,
                count: self.partitions.len(),
            })
    }

    /// Queue a write on `partition`, blocking while its queue is full.
    ///
    /// Writes to one partition are applied in the order they were queued.
    /// Must be called from a blocking context (a plain thread or
    /// `spawn_blocking`), never from inside an async task.
    pub fn enqueue(&self, partition: usize, op: IngestOp) -> Result<()> {
        self.partition(partition)?.enqueue(op)
    }

    /// Wait until every write queued before this call has been applied.
    ///
    /// Returns the first writer failure recorded by any partition. Blocking;
    /// same calling rules as [`Self::enqueue`].
    pub fn flush(&self) -> Result<()> {
        let mut pending = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            pending.push((partition, partition.send_barrier()?));
        }

        let mut first_error = None;
        for (partition, receiver) in pending {
            if let Err(e) = partition.wait_barrier(receiver) {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!("Additional flush failure: {}", e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Keys of `partition` starting with `prefix`, prefix stripped, ascending.
    pub fn prefix_scan(&self, partition: usize, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.partition(partition)?.prefix_scan(prefix)
    }

    /// Point lookup on `partition`.
    pub fn get(&self, partition: usize, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.partition(partition)?.get(key)
    }

    /// Current counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            layout: self.config.layout,
            partitions: self.partitions.iter().map(Partition::stats).collect(),
        }
    }

    /// Whether [`Self::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drain every partition's queue and release its engine.
    ///
    /// Waits for all partitions even when some fail, then reports every
    /// failure together. Later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("Closing store at {:?}", self.config.base_path);

        close_all(&self.partitions, Partition::close)?;
        info!("Store closed");
        Ok(())
    }
}

/// Close every item, collecting all failures instead of stopping at the first.
fn close_all<T>(items: &[T], close: impl Fn(&T) -> Vec<StoreError>) -> Result<()> {
    let errors: Vec<StoreError> = items.iter().flat_map(close).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Close(errors))
    }
}

impl Drop for PartitionedStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Store closed with errors on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Durability;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir, partitions: usize) -> PartitionedStore {
        let config = StoreConfig::new(dir.path().join("db"))
            .with_partitions(partitions)
            .with_queue_capacity(16);
        PartitionedStore::open(config).unwrap()
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0x01, 0xff, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0x00]), Some(vec![0x01]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
        assert_eq!(prefix_upper_bound(&[]), None);
    }

    #[test]
    fn test_set_then_scan() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3);

        let partition = store.partition_of(b"id");
        for label in [&b"b"[..], b"a", b"c"] {
            let mut key = b"id".to_vec();
            key.extend_from_slice(label);
            store.enqueue(partition, IngestOp::set(key, Vec::new())).unwrap();
        }
        // Shares the first byte only; must not show up
        store
            .enqueue(partition, IngestOp::set(b"ix".to_vec(), Vec::new()))
            .unwrap();
        store.flush().unwrap();

        let keys = store.prefix_scan(partition, b"id").unwrap();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        store.close().unwrap();
    }

    #[test]
    fn test_scan_with_unbounded_prefix() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 1);

        store
            .enqueue(0, IngestOp::set(vec![0xff, 0xff, 0x01], Vec::new()))
            .unwrap();
        store
            .enqueue(0, IngestOp::set(vec![0xfe, 0xff], Vec::new()))
            .unwrap();
        store.flush().unwrap();

        assert_eq!(store.prefix_scan(0, &[0xff, 0xff]).unwrap(), vec![vec![0x01]]);
        assert_eq!(store.prefix_scan(0, &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_append_joins_values() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 2);
        let partition = store.partition_of(b"k");

        store
            .enqueue(partition, IngestOp::append(b"k".to_vec(), b"A".to_vec()))
            .unwrap();
        store
            .enqueue(
                partition,
                IngestOp::append(b"k".to_vec(), b"B".to_vec()).with_durability(Durability::Synced),
            )
            .unwrap();
        store.flush().unwrap();

        assert_eq!(store.get(partition, b"k").unwrap(), Some(b"A,B".to_vec()));
        assert_eq!(store.get(partition, b"missing").unwrap(), None);
    }

    #[test]
    fn test_unknown_partition() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 2);
        let err = store.enqueue(5, IngestOp::set(b"k".to_vec(), Vec::new())).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnknownPartition {
                partition: 5,
                count: 2
            }
        ));
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 2);

        store.close().unwrap();
        assert!(store.is_closed());
        store.close().unwrap();

        let err = store.enqueue(0, IngestOp::set(b"k".to_vec(), Vec::new())).unwrap_err();
        assert!(matches!(err, StoreError::PartitionClosed { partition: 0 }));
        assert!(matches!(
            store.prefix_scan(0, b"k"),
            Err(StoreError::PartitionClosed { .. })
        ));
        assert!(matches!(store.flush(), Err(StoreError::PartitionClosed { .. })));
    }

    #[test]
    fn test_stats_count_applied_ops() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 2);

        for n in 0u64..20 {
            let key = n.to_le_bytes();
            store
                .enqueue(store.partition_of(&key), IngestOp::set(key.to_vec(), Vec::new()))
                .unwrap();
        }
        store.flush().unwrap();

        let stats = store.stats();
        assert_eq!(stats.partitions.len(), 2);
        assert_eq!(stats.applied(), 20);
        assert_eq!(stats.failed(), 0);
        assert!(stats.partitions.iter().all(|p| p.queued == 0));
    }

    #[test]
    fn test_close_all_visits_every_item_and_aggregates() {
        let visited = parking_lot::Mutex::new(Vec::new());
        let err = close_all(&[0usize, 1, 2, 3], |&partition| {
            visited.lock().push(partition);
            if partition % 2 == 0 {
                vec![StoreError::WriterFailed {
                    partition,
                    reason: "disk full".to_string(),
                }]
            } else {
                Vec::new()
            }
        })
        .unwrap_err();

        assert_eq!(visited.into_inner(), vec![0, 1, 2, 3]);
        let StoreError::Close(errors) = err else {
            panic!("expected aggregated close error, got {err}");
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], StoreError::WriterFailed { partition: 0, .. }));
        assert!(matches!(errors[1], StoreError::WriterFailed { partition: 2, .. }));
    }

    #[test]
    fn test_close_all_without_failures() {
        assert!(close_all(&[0usize, 1], |_| Vec::new()).is_ok());
    }
}
