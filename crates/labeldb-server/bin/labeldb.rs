//! labeldb server binary entry point.
//!
//! Parses configuration, initializes logging, opens the store and serves
//! HTTP until interrupted. For library usage, see the labeldb-server crate
//! documentation.

use anyhow::Result;
use labeldb_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_args();

    tracing::info!(
        "Configuration loaded: HTTP={}, db={:?}, partitions={}, layout={:?}",
        config.http_bind,
        config.db_path,
        config.partitions,
        config.layout
    );

    config.validate()?;

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
