//! Parallel, boundary-correct line splitting.
//!
//! A file is cut into `workers` contiguous byte ranges that are scanned
//! concurrently. A worker cannot tell whether the bytes around its range
//! edges belong to lines started by a neighbour, so it delivers only the
//! lines it sees complete and keeps three pieces of boundary state:
//!
//! - `head`: bytes before the first `\n` in the range (the rest of the
//!   previous range's last line, or the first line of the file)
//! - `tail`: bytes after the last `\n` in the range
//! - `saw_terminator`: whether the range contains any `\n`, in which case
//!   `head` ends a line
//!
//! After all workers join, a sequential stitch over the ranges in order
//! rebuilds the lines that crossed range edges with a single carry buffer.
//! Every line is delivered exactly once wherever the cuts fall, and only
//! O(workers) fragments are carried between ranges.

use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use tracing::{debug, trace, warn};

/// Size of each bounded read issued by a worker
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Largest worker count callers should request; front ends reject more
pub const MAX_SCAN_WORKERS: usize = 1024;

const LINE_TERMINATOR: u8 = b'\n';

const fn is_line_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c)
}

/// Strip surrounding space, tab, CR, LF, vertical tab and form feed.
pub fn trim_line(line: &[u8]) -> &[u8] {
    let Some(start) = line.iter().position(|&b| !is_line_space(b)) else {
        return &[];
    };
    let end = line
        .iter()
        .rposition(|&b| !is_line_space(b))
        .map_or(start, |end| end + 1);
    &line[start..end]
}

/// Cut `len` bytes into near-equal ranges; the last runs to EOF.
///
/// Never more ranges than bytes, so every range but an empty file's single
/// range is non-empty.
pub fn split_ranges(len: u64, workers: usize) -> Vec<Range<u64>> {
    let workers = usize::try_from(len)
        .map_or(workers, |len| workers.min(len))
        .max(1);
    let chunk = len / workers as u64;
    (0..workers)
        .map(|i| {
            let start = chunk * i as u64;
            let end = if i + 1 == workers { len } else { start + chunk };
            start..end
        })
        .collect()
}

/// Boundary fragments left over by one range
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragments {
    /// Bytes before the first terminator (all bytes if none)
    pub head: Vec<u8>,
    /// Bytes after the last terminator
    pub tail: Vec<u8>,
    /// At least one terminator was seen in the range
    pub saw_terminator: bool,
}

/// Line state machine for one byte range.
#[derive(Debug, Default)]
pub struct RangeScanner {
    head: Vec<u8>,
    current: Vec<u8>,
    saw_terminator: bool,
}

impl RangeScanner {
    /// Create a scanner for a fresh range
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the range, delivering each complete line
    /// after the first terminator to `emit`.
    pub fn feed<F>(&mut self, chunk: &[u8], emit: &F) -> Result<()>
    where
        F: Fn(&[u8]) -> Result<()>,
    {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == LINE_TERMINATOR) {
            let piece = &rest[..pos];
            if !self.saw_terminator {
                self.current.extend_from_slice(piece);
                self.head = std::mem::take(&mut self.current);
                self.saw_terminator = true;
            } else if self.current.is_empty() {
                emit(piece)?;
            } else {
                self.current.extend_from_slice(piece);
                emit(&self.current)?;
                self.current.clear();
            }
            rest = &rest[pos + 1..];
        }
        self.current.extend_from_slice(rest);
        Ok(())
    }

    /// Finish the range and hand back its boundary fragments.
    pub fn finish(self) -> Fragments {
        if self.saw_terminator {
            Fragments {
                head: self.head,
                tail: self.current,
                saw_terminator: true,
            }
        } else {
            Fragments {
                head: self.current,
                tail: Vec::new(),
                saw_terminator: false,
            }
        }
    }
}

/// Rebuild the lines that crossed range edges, in range order.
pub fn stitch<F>(fragments: &[Fragments], emit: &F) -> Result<()>
where
    F: Fn(&[u8]) -> Result<()>,
{
    let mut pending = Vec::new();
    for fragment in fragments {
        pending.extend_from_slice(&fragment.head);
        if fragment.saw_terminator {
            if !pending.is_empty() {
                emit(&pending)?;
            }
            pending.clear();
        }
        pending.extend_from_slice(&fragment.tail);
    }
    if !pending.is_empty() {
        emit(&pending)?;
    }
    Ok(())
}

/// Parallel line scanner over a file
#[derive(Debug, Clone, Copy)]
pub struct LineSplitter {
    workers: usize,
    buffer_size: usize,
}

impl LineSplitter {
    /// Create a splitter using `workers` byte ranges (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Override the per-read buffer size
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Number of byte ranges scanned concurrently
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Deliver every non-empty trimmed line of `path` to `per_line`.
    ///
    /// `per_line` is called concurrently from the worker threads in no
    /// particular order. The first failure (callback or I/O) stops the scan
    /// and is returned; failures after it are logged. Returns the number of
    /// lines delivered.
    pub fn scan<F>(&self, path: &Path, per_line: F) -> Result<u64>
    where
        F: Fn(&[u8]) -> Result<()> + Sync,
    {
        let len = File::open(path)
            .and_then(|file| file.metadata())
            .map_err(|source| StoreError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let lines = AtomicU64::new(0);
        let emit = |line: &[u8]| -> Result<()> {
            let line = trim_line(line);
            if line.is_empty() {
                return Ok(());
            }
            per_line(line)?;
            lines.fetch_add(1, Ordering::Relaxed);
            Ok(())
        };

        if len == 0 {
            return Ok(0);
        }

        let ranges = split_ranges(len, self.workers);
        debug!(
            "Scanning {:?} ({} bytes) with {} workers",
            path,
            len,
            ranges.len()
        );

        let stop = AtomicBool::new(false);
        let first_error: Mutex<Option<StoreError>> = Mutex::new(None);
        let record_error = |error: StoreError| {
            stop.store(true, Ordering::Relaxed);
            let mut slot = first_error.lock();
            if slot.is_none() {
                *slot = Some(error);
            } else {
                warn!("Additional error while scanning {:?}: {}", path, error);
            }
        };

        let buffer_size = self.buffer_size;
        let (stop, emit_line, record) = (&stop, &emit, &record_error);
        let fragments: Vec<Option<Fragments>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(ranges.len());
            for (worker, range) in ranges.iter().cloned().enumerate() {
                let spawned = thread::Builder::new()
                    .name(format!("labeldb-scan-{worker}"))
                    .spawn_scoped(scope, move || {
                        match scan_range(path, worker, range, buffer_size, stop, emit_line) {
                            Ok(fragments) => fragments,
                            Err(e) => {
                                record(e);
                                None
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        // Workers already running see the stop flag and wind down
                        record(StoreError::ScanWorkerSpawn { worker, source });
                        break;
                    }
                }
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        record(StoreError::ScanWorkerPanicked { worker });
                        None
                    })
                })
                .collect()
        });

        if let Some(error) = first_error.into_inner() {
            return Err(error);
        }

        // Without a recorded error every worker ran to completion
        let fragments: Vec<Fragments> = fragments.into_iter().flatten().collect();
        stitch(&fragments, &emit)?;

        Ok(lines.load(Ordering::Relaxed))
    }
}

/// Scan one byte range. Returns `None` when another worker stopped the scan.
fn scan_range<F>(
    path: &Path,
    worker: usize,
    range: Range<u64>,
    buffer_size: usize,
    stop: &AtomicBool,
    emit: &F,
) -> Result<Option<Fragments>>
where
    F: Fn(&[u8]) -> Result<()>,
{
    let mut scanner = RangeScanner::new();
    if range.is_empty() {
        return Ok(Some(scanner.finish()));
    }

    let read_error = |source: std::io::Error| StoreError::FileRead {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(|source| StoreError::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    file.seek(SeekFrom::Start(range.start)).map_err(read_error)?;
    let mut reader = file.take(range.end - range.start);
    let mut buffer = vec![0u8; buffer_size];

    loop {
        if stop.load(Ordering::Relaxed) {
            trace!("Worker {} stopping early", worker);
            return Ok(None);
        }
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        scanner.feed(&buffer[..read], emit)?;
    }

    trace!("Worker {} finished range {:?}", worker, range);
    Ok(Some(scanner.finish()))
}
