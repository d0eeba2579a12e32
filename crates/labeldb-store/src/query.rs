//! Label lookups.

use crate::codec::encode_identifier;
use crate::config::KeyLayout;
use crate::error::Result;
use crate::store::{APPEND_SEPARATOR, PartitionedStore};
use std::sync::Arc;
use tracing::trace;

/// Answers "which labels does this identifier have".
#[derive(Debug, Clone)]
pub struct LabelQuery {
    store: Arc<PartitionedStore>,
}

impl LabelQuery {
    /// Create a query handle over `store`
    pub const fn new(store: Arc<PartitionedStore>) -> Self {
        Self { store }
    }

    /// Labels of `identifier` in ascending byte order.
    ///
    /// An identifier with no labels yields an empty list. Invalid identifier
    /// text is an error. Reads bypass the write queues, so writes still
    /// queued may not be visible yet.
    pub fn labels_of(&self, identifier: impl AsRef<[u8]>) -> Result<Vec<Vec<u8>>> {
        let key = encode_identifier(identifier.as_ref())?;
        let partition = self.store.partition_of(&key);

        let labels = match self.store.layout() {
            KeyLayout::Association => self.store.prefix_scan(partition, &key)?,
            KeyLayout::Joined => {
                let Some(value) = self.store.get(partition, &key)? else {
                    return Ok(Vec::new());
                };
                // Appends are not idempotent; repeated loads leave duplicates
                let mut labels: Vec<Vec<u8>> = value
                    .split(|&b| b == APPEND_SEPARATOR)
                    .filter(|label| !label.is_empty())
                    .map(<[u8]>::to_vec)
                    .collect();
                labels.sort_unstable();
                labels.dedup();
                labels
            }
        };

        trace!(
            "Identifier {} has {} labels in partition {}",
            String::from_utf8_lossy(identifier.as_ref()),
            labels.len(),
            partition
        );
        Ok(labels)
    }
}
