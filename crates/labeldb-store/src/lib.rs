//! Partitioned label store with parallel bulk ingestion.
//!
//! Loads very large files of newline-delimited numeric identifiers, attaches
//! a label to every identifier and answers "which labels does identifier X
//! have" from P RocksDB partitions.
//!
//! # Architecture
//!
//! - `codec`: identifier text to fixed-width 8-byte keys
//! - `router`: stable XXH64 key to partition mapping
//! - `store`: partitions, each with one writer thread behind a bounded queue
//! - `splitter`: parallel line scanner with boundary stitching
//! - `loader`: file to store ingestion pipeline
//! - `query`: label lookups by prefix scan
//!
//! # Example
//!
//! ```no_run
//! use labeldb_store::{LabelLoader, LabelQuery, LoadOptions, PartitionedStore, StoreConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> labeldb_store::Result<()> {
//! let store = Arc::new(PartitionedStore::open(StoreConfig::new("labelsdb/db"))?);
//!
//! let loader = LabelLoader::new(Arc::clone(&store));
//! let report = loader.load_file(Path::new("mobiles.txt"), b"label2", &LoadOptions::default())?;
//! println!("{} lines in {:?}", report.lines, report.elapsed);
//!
//! let query = LabelQuery::new(Arc::clone(&store));
//! let labels = query.labels_of("18297123752")?;
//! assert!(labels.contains(&b"label2".to_vec()));
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod codec;
pub mod config;
pub mod error;
pub mod loader;
pub mod query;
pub mod router;
pub mod splitter;
pub mod store;

pub use codec::{IDENTIFIER_KEY_LEN, IdentifierKey, association_key, encode_identifier};
pub use config::{Durability, KeyLayout, StoreConfig, default_parallelism};
pub use error::{Result, StoreError};
pub use loader::{LabelLoader, LoadOptions, LoadReport};
pub use query::LabelQuery;
pub use router::partition_of;
pub use splitter::{LineSplitter, MAX_SCAN_WORKERS};
pub use store::{IngestOp, PartitionStats, PartitionedStore, StoreStats, prefix_upper_bound};
