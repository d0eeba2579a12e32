//! Store manifest.
//!
//! Records the partition count and key layout a store was created with. The
//! key to partition mapping depends on the partition count, and the two key
//! layouts cannot read each other's rows, so reopening with different
//! settings must fail instead of silently misrouting.

use crate::config::{KeyLayout, StoreConfig};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use tracing::{debug, info};

/// Manifest format version
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub version: u32,
    pub partitions: usize,
    pub layout: KeyLayout,
}

impl Manifest {
    fn for_config(config: &StoreConfig) -> Self {
        Self {
            version: MANIFEST_VERSION,
            partitions: config.partitions,
            layout: config.layout,
        }
    }

    fn describe(&self) -> String {
        format!("{} partitions, {} layout", self.partitions, self.layout)
    }
}

/// Verify an existing manifest against `config`, or write a new one.
pub(crate) fn check_or_create(config: &StoreConfig) -> Result<Manifest> {
    let path = config.manifest_path();
    let requested = Manifest::for_config(config);

    match fs::read(&path) {
        Ok(bytes) => {
            let found: Manifest =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Manifest {
                    path: path.clone(),
                    reason: format!("invalid JSON: {e}"),
                })?;
            if found.version != MANIFEST_VERSION {
                return Err(StoreError::Manifest {
                    path,
                    reason: format!("unsupported manifest version {}", found.version),
                });
            }
            if found.partitions != requested.partitions || found.layout != requested.layout {
                return Err(StoreError::ManifestMismatch {
                    path,
                    found: found.describe(),
                    requested: requested.describe(),
                });
            }
            debug!("Manifest {:?} matches: {}", path, found.describe());
            Ok(found)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| StoreError::Manifest {
                    path: path.clone(),
                    reason: format!("cannot create parent directory: {e}"),
                })?;
            }
            let json = serde_json::to_vec_pretty(&requested).map_err(|e| StoreError::Manifest {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            fs::write(&path, json).map_err(|e| StoreError::Manifest {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            info!("Created store manifest {:?}: {}", path, requested.describe());
            Ok(requested)
        }
        Err(e) => Err(StoreError::Manifest {
            path,
            reason: e.to_string(),
        }),
    }
}
