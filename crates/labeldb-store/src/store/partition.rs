//! A single partition: one RocksDB instance and the only thread that writes to it.

use crate::config::Durability;
use crate::error::{Result, StoreError};
use crate::store::prefix_upper_bound;
use parking_lot::{Mutex, RwLock};
use rocksdb::{DB, Direction, IteratorMode, Options, ReadOptions, WriteOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

/// Separator between labels in a joined value
pub const APPEND_SEPARATOR: u8 = b',';

/// Write request queued to a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOp {
    /// Unconditional overwrite
    Set {
        /// Row key
        key: Vec<u8>,
        /// Row value
        value: Vec<u8>,
        /// Durability of this write
        durability: Durability,
    },
    /// Read-modify-write: join `value` onto the existing value with `,`
    Append {
        /// Row key
        key: Vec<u8>,
        /// Value to append
        value: Vec<u8>,
        /// Durability of this write
        durability: Durability,
    },
}

impl IngestOp {
    /// Overwrite `key` with `value` using relaxed durability
    pub fn set(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            durability: Durability::Relaxed,
        }
    }

    /// Append `value` to `key` using relaxed durability
    pub fn append(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Append {
            key: key.into(),
            value: value.into(),
            durability: Durability::Relaxed,
        }
    }

    /// Same op with a different durability
    #[must_use]
    pub fn with_durability(self, durability: Durability) -> Self {
        match self {
            Self::Set { key, value, .. } => Self::Set {
                key,
                value,
                durability,
            },
            Self::Append { key, value, .. } => Self::Append {
                key,
                value,
                durability,
            },
        }
    }
}

/// Queue item consumed by the writer thread
#[derive(Debug)]
enum Command {
    Write(IngestOp),
    /// Acknowledged once every earlier command has been applied; carries the
    /// writer's recorded failure, if any
    Barrier(oneshot::Sender<Option<String>>),
}

/// Per-partition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    /// Partition index
    pub index: usize,
    /// Ops applied to the engine
    pub applied: u64,
    /// Ops that failed or were skipped after a failure
    pub failed: u64,
    /// Ops currently waiting in the queue
    pub queued: usize,
}

#[derive(Debug, Default)]
struct WriterState {
    failure: Mutex<Option<String>>,
    applied: AtomicU64,
    failed: AtomicU64,
}

impl WriterState {
    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

pub(crate) struct Partition {
    index: usize,
    path: PathBuf,
    db: RwLock<Option<Arc<DB>>>,
    sender: RwLock<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<WriterState>,
}

impl Partition {
    /// Open the engine at `path` and start the partition's writer thread.
    pub(crate) fn open(index: usize, path: &Path, queue_capacity: usize) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);

        let db = DB::open(&options, path).map_err(|source| StoreError::PartitionOpen {
            partition: index,
            path: path.to_path_buf(),
            source,
        })?;
        let db = Arc::new(db);

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let state = Arc::new(WriterState::default());

        let writer_db = Arc::clone(&db);
        let writer_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name(format!("labeldb-partition-{index}"))
            .spawn(move || run_writer(index, &writer_db, receiver, &writer_state))
            .map_err(|source| StoreError::WriterSpawn {
                partition: index,
                source,
            })?;

        debug!("Opened partition {} at {:?}", index, path);

        Ok(Self {
            index,
            path: path.to_path_buf(),
            db: RwLock::new(Some(db)),
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            state,
        })
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>> {
        if let Some(reason) = self.state.failure() {
            return Err(StoreError::WriterFailed {
                partition: self.index,
                reason,
            });
        }
        self.sender.read().clone().ok_or_else(|| self.closed())
    }

    fn engine(&self) -> Result<Arc<DB>> {
        self.db.read().clone().ok_or_else(|| self.closed())
    }

    const fn closed(&self) -> StoreError {
        StoreError::PartitionClosed {
            partition: self.index,
        }
    }

    /// Queue a write, blocking while the queue is full.
    ///
    /// Must not be called from an async context.
    pub(crate) fn enqueue(&self, op: IngestOp) -> Result<()> {
        self.sender()?
            .blocking_send(Command::Write(op))
            .map_err(|_| self.closed())
    }

    /// Queue a barrier and return the receiver of its acknowledgement.
    pub(crate) fn send_barrier(&self) -> Result<oneshot::Receiver<Option<String>>> {
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or_else(|| self.closed())?;
        let (ack, receiver) = oneshot::channel();
        sender
            .blocking_send(Command::Barrier(ack))
            .map_err(|_| self.closed())?;
        Ok(receiver)
    }

    /// Wait for a barrier sent with [`Self::send_barrier`].
    pub(crate) fn wait_barrier(&self, receiver: oneshot::Receiver<Option<String>>) -> Result<()> {
        match receiver.blocking_recv() {
            Ok(None) => Ok(()),
            Ok(Some(reason)) => Err(StoreError::WriterFailed {
                partition: self.index,
                reason,
            }),
            Err(_) => Err(self.closed()),
        }
    }

    /// Keys starting with `prefix`, prefix stripped, in ascending order.
    pub(crate) fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let db = self.engine()?;

        let mut read_options = ReadOptions::default();
        read_options.set_iterate_lower_bound(prefix.to_vec());
        if let Some(upper) = prefix_upper_bound(prefix) {
            read_options.set_iterate_upper_bound(upper);
        }

        let mut keys = Vec::new();
        for item in db.iterator_opt(IteratorMode::From(prefix, Direction::Forward), read_options) {
            let (key, _value) = item.map_err(|source| StoreError::Engine {
                partition: self.index,
                operation: "scan",
                source,
            })?;
            keys.push(key[prefix.len()..].to_vec());
        }

        trace!(
            "Prefix scan on partition {} returned {} keys",
            self.index,
            keys.len()
        );
        Ok(keys)
    }

    /// Point lookup.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine()?
            .get(key)
            .map_err(|source| StoreError::Engine {
                partition: self.index,
                operation: "get",
                source,
            })
    }

    pub(crate) fn stats(&self) -> PartitionStats {
        let queued = self
            .sender
            .read()
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity());
        PartitionStats {
            index: self.index,
            applied: self.state.applied.load(Ordering::Relaxed),
            failed: self.state.failed.load(Ordering::Relaxed),
            queued,
        }
    }

    /// Stop accepting writes, drain the queue, flush and release the engine.
    ///
    /// Returns every error encountered; an empty vector means a clean close.
    /// Calling it again after a close is a no-op.
    pub(crate) fn close(&self) -> Vec<StoreError> {
        let mut errors = Vec::new();

        // The channel closes once in-flight producers drop their clones
        drop(self.sender.write().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                errors.push(StoreError::WriterPanicked {
                    partition: self.index,
                });
            } else if let Some(reason) = self.state.failure() {
                errors.push(StoreError::WriterFailed {
                    partition: self.index,
                    reason,
                });
            }
        }

        let db = self.db.write().take();
        if let Some(db) = db {
            if let Err(source) = db.flush() {
                errors.push(StoreError::Engine {
                    partition: self.index,
                    operation: "flush",
                    source,
                });
            }
            debug!("Closed partition {} at {:?}", self.index, self.path);
        }

        errors
    }
}

fn write_options(durability: Durability) -> WriteOptions {
    let mut options = WriteOptions::default();
    options.set_sync(durability == Durability::Synced);
    options
}

fn apply(db: &DB, partition: usize, op: IngestOp) -> Result<()> {
    let engine_error = |operation: &'static str| {
        move |source: rocksdb::Error| StoreError::Engine {
            partition,
            operation,
            source,
        }
    };

    match op {
        IngestOp::Set {
            key,
            value,
            durability,
        } => db
            .put_opt(key, value, &write_options(durability))
            .map_err(engine_error("put")),
        IngestOp::Append {
            key,
            value,
            durability,
        } => {
            let merged = match db.get(&key).map_err(engine_error("get"))? {
                Some(mut existing) if !existing.is_empty() => {
                    existing.push(APPEND_SEPARATOR);
                    existing.extend_from_slice(&value);
                    existing
                }
                _ => value,
            };
            db.put_opt(key, merged, &write_options(durability))
                .map_err(engine_error("put"))
        }
    }
}

/// Writer loop: the single consumer of a partition's queue.
///
/// After the first engine failure the remaining writes are counted and
/// skipped, but the queue keeps draining so producers never block forever.
fn run_writer(
    index: usize,
    db: &DB,
    mut receiver: mpsc::Receiver<Command>,
    state: &WriterState,
) {
    debug!("Partition {} writer started", index);

    while let Some(command) = receiver.blocking_recv() {
        match command {
            Command::Write(op) => {
                if state.failure.lock().is_some() {
                    state.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                match apply(db, index, op) {
                    Ok(()) => {
                        state.applied.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!("Partition {} write failed: {}", index, e);
                        state.failed.fetch_add(1, Ordering::Relaxed);
                        *state.failure.lock() = Some(e.to_string());
                    }
                }
            }
            Command::Barrier(ack) => {
                // Receiver may have given up waiting
                let _ = ack.send(state.failure());
            }
        }
    }

    debug!(
        "Partition {} writer drained ({} applied)",
        index,
        state.applied.load(Ordering::Relaxed)
    );
}
