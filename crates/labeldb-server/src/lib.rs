//! HTTP front end for the labeldb partitioned label store.
//!
//! # Architecture
//!
//! - `config`: CLI and environment configuration
//! - `server`: shared state and lifecycle (open store, serve, drain and close)
//! - `http`: axum router and JSON handlers
//!
//! # Example
//!
//! ```no_run
//! use labeldb_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let config = ServerConfig::from_args();
//!     config.validate()?;
//!
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Endpoints
//!
//! - `POST /load/{file}/{label}?noop&serial&workers=N`
//! - `GET /labels/{identifier}`
//! - `GET /health`

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod http;
pub mod server;

pub use config::{LayoutArg, ServerConfig};
pub use error::{ConfigError, ServerError};
pub use server::{AppState, Server};
