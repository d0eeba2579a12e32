//! Server state management and orchestration.
//!
//! Owns the partitioned store for the lifetime of the process and closes it
//! (draining every write queue) once the HTTP listener stops.

use crate::config::ServerConfig;
use crate::error::ServerError;
use labeldb_store::{LabelLoader, LabelQuery, LoadOptions, PartitionedStore, StoreStats};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Shared application state for HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Partitioned store (opened once at startup)
    store: Arc<PartitionedStore>,

    /// Ingestion pipeline over `store`
    loader: LabelLoader,

    /// Lookup handle over `store`
    query: LabelQuery,

    /// Options applied to loads that do not override them
    load_defaults: LoadOptions,

    /// Directory load requests are resolved against
    load_root: PathBuf,

    /// Server start time
    started_at: SystemTime,
}

impl AppState {
    /// Open the store described by `config` and build application state.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the store cannot be opened or its manifest
    /// disagrees with the configured partition count or layout.
    pub fn new(config: &ServerConfig) -> Result<Self, ServerError> {
        tracing::info!("Opening label store at {:?}", config.db_path);

        let store = Arc::new(PartitionedStore::open(config.store_config())?);

        tracing::info!(
            "Opened {} partitions with {} layout",
            store.partition_count(),
            store.layout()
        );

        Ok(Self {
            loader: LabelLoader::new(Arc::clone(&store)),
            query: LabelQuery::new(Arc::clone(&store)),
            store,
            load_defaults: LoadOptions::default()
                .with_parallelism(config.default_workers())
                .with_durability(config.durability()),
            load_root: config.load_root.clone(),
            started_at: SystemTime::now(),
        })
    }

    /// Get reference to the store.
    #[must_use]
    pub const fn store(&self) -> &Arc<PartitionedStore> {
        &self.store
    }

    /// Get the ingestion pipeline.
    #[must_use]
    pub const fn loader(&self) -> &LabelLoader {
        &self.loader
    }

    /// Get the lookup handle.
    #[must_use]
    pub const fn query(&self) -> &LabelQuery {
        &self.query
    }

    /// Load options used when a request does not override them.
    #[must_use]
    pub const fn load_defaults(&self) -> LoadOptions {
        self.load_defaults
    }

    /// Directory load requests resolve file names against.
    #[must_use]
    pub fn load_root(&self) -> &Path {
        &self.load_root
    }

    /// Writer counters for every partition.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Server orchestration.
pub struct Server {
    /// Shared application state
    state: Arc<AppState>,
    /// Server configuration
    config: ServerConfig,
}

impl Server {
    /// Create new server with configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the store cannot be opened.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let state = AppState::new(&config)?;

        Ok(Self {
            state: Arc::new(state),
            config,
        })
    }

    /// Run the HTTP listener until interrupted, then close the store.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails, the shutdown signal cannot be
    /// installed, or any partition fails to close cleanly.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Starting labeldb server");
        tracing::info!("HTTP server binding to: {}", self.config.http_bind);

        let http_state = Arc::clone(&self.state);
        let http_bind = self.config.http_bind;

        let mut http_server =
            tokio::spawn(async move { crate::http::start_server(http_bind, http_state).await });

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| {
                    ServerError::Shutdown(format!("Failed to listen for shutdown signal: {e}"))
                })?;
                tracing::info!("Shutdown signal received, stopping server");
                http_server.abort();
            }
            result = &mut http_server => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!("HTTP server failed: {e}");
                        self.close_store().await;
                        return Err(e);
                    }
                    Err(e) => {
                        self.close_store().await;
                        return Err(ServerError::Shutdown(format!("HTTP server task failed: {e}")));
                    }
                }
            }
        }

        // In-flight loads hold the store; close drains whatever they queued
        let store = Arc::clone(self.state.store());
        tokio::task::spawn_blocking(move || store.close())
            .await
            .map_err(|e| ServerError::Shutdown(format!("Store close task failed: {e}")))??;

        tracing::info!("Store closed");
        Ok(())
    }

    /// Close the store off the async runtime after the listener failed.
    async fn close_store(&self) {
        let store = Arc::clone(self.state.store());
        match tokio::task::spawn_blocking(move || store.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to close store after server error: {e}"),
            Err(e) => tracing::warn!("Store close task failed after server error: {e}"),
        }
    }

    /// Get shared application state (for testing).
    #[cfg(test)]
    #[must_use]
    pub const fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}
