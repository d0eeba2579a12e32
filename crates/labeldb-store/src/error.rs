//! Error types for label storage and ingestion.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the codec, the line splitter, the partitioned store and
/// the ingestion/query pipelines.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Identifier text is not a base-10 integer that fits in 64 bits
    #[error("Invalid identifier '{text}': {reason}")]
    InvalidIdentifier {
        /// Offending identifier text (lossy UTF-8)
        text: String,
        /// Why parsing failed
        reason: String,
    },

    /// Label cannot be stored under the configured key layout
    #[error("Invalid label: {reason}")]
    InvalidLabel {
        /// Why the label was rejected
        reason: String,
    },

    /// Input file could not be opened
    #[error("Failed to open {path}: {source}")]
    FileOpen {
        /// Path of the input file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Input file failed mid-scan (seek or read)
    #[error("Failed to read {path}: {source}")]
    FileRead {
        /// Path of the input file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A single line of an input file could not be processed
    #[error("{path}: {source}")]
    Line {
        /// Path of the input file
        path: PathBuf,
        /// Line-level failure
        #[source]
        source: Box<StoreError>,
    },

    /// Partition engine could not be opened
    #[error("Failed to open partition {partition} at {path}: {source}")]
    PartitionOpen {
        /// Partition index
        partition: usize,
        /// On-disk location of the partition
        path: PathBuf,
        /// Engine error
        #[source]
        source: rocksdb::Error,
    },

    /// Engine read, write or flush failure
    #[error("Partition {partition} {operation} failed: {source}")]
    Engine {
        /// Partition index
        partition: usize,
        /// Engine operation that failed
        operation: &'static str,
        /// Engine error
        #[source]
        source: rocksdb::Error,
    },

    /// Partition index outside `0..partition_count`
    #[error("Unknown partition {partition} (store has {count})")]
    UnknownPartition {
        /// Requested partition index
        partition: usize,
        /// Number of partitions in the store
        count: usize,
    },

    /// Partition writer thread could not be started
    #[error("Failed to start writer for partition {partition}: {source}")]
    WriterSpawn {
        /// Partition index
        partition: usize,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Partition no longer accepts writes
    #[error("Partition {partition} is closed")]
    PartitionClosed {
        /// Partition index
        partition: usize,
    },

    /// Partition writer hit an engine failure and stopped applying writes
    #[error("Partition {partition} writer failed: {reason}")]
    WriterFailed {
        /// Partition index
        partition: usize,
        /// First failure recorded by the writer
        reason: String,
    },

    /// Partition writer thread panicked
    #[error("Partition {partition} writer panicked")]
    WriterPanicked {
        /// Partition index
        partition: usize,
    },

    /// Line scan worker thread panicked
    #[error("Scan worker {worker} panicked")]
    ScanWorkerPanicked {
        /// Worker (byte range) index
        worker: usize,
    },

    /// Scan worker thread could not be started
    #[error("Failed to spawn scan worker {worker}: {source}")]
    ScanWorkerSpawn {
        /// Worker (byte range) index
        worker: usize,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Existing store was created with a different layout or partition count
    #[error(
        "Store at {path} was created with {found}, refusing to open with {requested} (full reload required)"
    )]
    ManifestMismatch {
        /// Manifest file path
        path: PathBuf,
        /// Settings recorded on disk
        found: String,
        /// Settings requested by the caller
        requested: String,
    },

    /// Manifest could not be read or written
    #[error("Manifest {path}: {reason}")]
    Manifest {
        /// Manifest file path
        path: PathBuf,
        /// Failure description
        reason: String,
    },

    /// Store configuration is unusable
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// One or more partitions failed to close cleanly
    #[error("Failed to close {} partition(s): {}", .0.len(), join_errors(.0))]
    Close(Vec<StoreError>),
}

impl StoreError {
    /// Create an invalid identifier error from raw line bytes
    pub fn invalid_identifier(text: &[u8], reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            text: String::from_utf8_lossy(text).into_owned(),
            reason: reason.into(),
        }
    }

    /// Whether this error (or the line failure it wraps) is caused by bad input
    /// rather than by I/O or the engine
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::InvalidIdentifier { .. } | Self::InvalidLabel { .. } => true,
            Self::Line { source, .. } => source.is_invalid_input(),
            _ => false,
        }
    }
}

fn join_errors(errors: &[StoreError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_message() {
        let err = StoreError::invalid_identifier(b"12a4", "not a digit");
        assert_eq!(err.to_string(), "Invalid identifier '12a4': not a digit");
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_line_error_keeps_path_context() {
        let err = StoreError::Line {
            path: PathBuf::from("mobiles.txt"),
            source: Box::new(StoreError::invalid_identifier(b"abc", "not a digit")),
        };
        assert!(err.to_string().starts_with("mobiles.txt: Invalid identifier 'abc'"));
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_close_error_aggregates() {
        let err = StoreError::Close(vec![
            StoreError::PartitionClosed { partition: 1 },
            StoreError::WriterPanicked { partition: 3 },
        ]);
        assert_eq!(
            err.to_string(),
            "Failed to close 2 partition(s): Partition 1 is closed; Partition 3 writer panicked"
        );
        assert!(!err.is_invalid_input());
    }
}
