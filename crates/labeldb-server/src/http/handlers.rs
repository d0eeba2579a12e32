//! HTTP request handlers for load, lookup and health endpoints.
//!
//! Every response is a JSON envelope: `{"status":"ok","body":...}` on
//! success, `{"status":"error","error":"..."}` otherwise. Store calls block
//! on file and engine I/O, so they run on the blocking pool.

use crate::config::check_workers;
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use labeldb_store::{KeyLayout, StoreError};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// Always `"ok"`
    pub status: &'static str,
    /// Endpoint-specific payload
    pub body: T,
}

impl<T: Serialize> Envelope<T> {
    fn ok(body: T) -> Json<Self> {
        Json(Self { status: "ok", body })
    }
}

/// Query flags accepted by the load endpoint.
///
/// `noop` and `serial` are switched on by their presence (`?noop&serial`);
/// an explicit `false` or `0` switches them off again.
#[derive(Debug, Default, Deserialize)]
pub struct LoadParams {
    /// Scan the file without writing anything
    pub noop: Option<String>,
    /// Scan with a single worker
    pub serial: Option<String>,
    /// Scan worker count for this load
    pub workers: Option<usize>,
}

fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| !matches!(v, "false" | "0"))
}

/// Body of a successful load.
#[derive(Debug, Serialize)]
pub struct LoadBody {
    /// Non-empty lines ingested
    pub lines: u64,
    /// Wall-clock duration of the load
    pub cost: String,
}

/// Body of a successful lookup.
#[derive(Debug, Serialize)]
pub struct LabelsBody {
    /// Labels in ascending byte order (lossy UTF-8)
    pub labels: Vec<String>,
    /// Wall-clock duration of the lookup
    pub cost: String,
}

/// Per-partition writer counters.
#[derive(Debug, Serialize)]
pub struct PartitionHealth {
    /// Partition index
    pub index: usize,
    /// Writes applied
    pub applied: u64,
    /// Writes failed or skipped after a failure
    pub failed: u64,
    /// Writes waiting in the queue
    pub queued: usize,
}

/// Body of the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthBody {
    /// Partition count
    pub partitions: usize,
    /// On-disk layout
    pub layout: KeyLayout,
    /// Total writes applied since startup
    pub applied: u64,
    /// Total writes failed since startup
    pub failed: u64,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Per-partition detail
    pub writers: Vec<PartitionHealth>,
}

/// Handle POST /load/{file}/{label}.
///
/// # Errors
///
/// Returns `AppError` for unsafe file names, a worker count outside
/// `1..=MAX_SCAN_WORKERS`, a missing file, invalid identifiers or labels,
/// and engine failures.
pub async fn handle_load(
    Path((file, label)): Path<(String, String)>,
    Query(params): Query<LoadParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, AppError> {
    let path = resolve_load_path(&state, &file)?;

    let mut options = state.load_defaults();
    if let Some(workers) = params.workers {
        check_workers(workers)
            .map_err(|reason| AppError::BadRequest(format!("workers {reason}")))?;
        options = options.with_parallelism(workers);
    }
    if flag(params.serial.as_deref()) {
        options = options.with_parallelism(1);
    }
    options = options.with_skip_write(flag(params.noop.as_deref()));

    tracing::debug!(
        "Handling load of {} under label {} ({} workers, dry run: {})",
        path.display(),
        label,
        options.parallelism,
        options.skip_write
    );

    let loader = state.loader().clone();
    let report = tokio::task::spawn_blocking(move || {
        loader.load_file(&path, label.as_bytes(), &options)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Load task failed: {e}")))??;

    Ok(Envelope::ok(LoadBody {
        lines: report.lines,
        cost: format!("{:?}", report.elapsed),
    })
    .into_response())
}

/// Handle GET /labels/{identifier}.
///
/// # Errors
///
/// Returns `AppError` for an invalid identifier or an engine failure.
pub async fn handle_labels(
    Path(identifier): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, AppError> {
    tracing::debug!("Handling labels request for identifier: {}", identifier);

    let started = Instant::now();
    let query = state.query().clone();
    let labels = tokio::task::spawn_blocking(move || query.labels_of(identifier))
        .await
        .map_err(|e| AppError::Internal(format!("Lookup task failed: {e}")))??;

    Ok(Envelope::ok(LabelsBody {
        labels: labels
            .iter()
            .map(|label| String::from_utf8_lossy(label).into_owned())
            .collect(),
        cost: format!("{:?}", started.elapsed()),
    })
    .into_response())
}

/// Handle GET /health.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let stats = state.stats();

    Envelope::ok(HealthBody {
        partitions: stats.partitions.len(),
        layout: stats.layout,
        applied: stats.applied(),
        failed: stats.failed(),
        uptime_seconds: state.uptime_seconds(),
        writers: stats
            .partitions
            .iter()
            .map(|p| PartitionHealth {
                index: p.index,
                applied: p.applied,
                failed: p.failed,
                queued: p.queued,
            })
            .collect(),
    })
    .into_response()
}

/// Resolve a request file name under the load root.
///
/// Only a single plain path component is accepted, so requests can never
/// reach outside the root.
fn resolve_load_path(state: &AppState, file: &str) -> Result<PathBuf, AppError> {
    let mut components = std::path::Path::new(file).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Ok(state.load_root().join(name)),
        _ => Err(AppError::BadRequest(format!("Invalid file name: {file}"))),
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    error: String,
}

/// Application-level error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request, identifier or label (400)
    BadRequest(String),
    /// File to load does not exist (404)
    NotFound(String),
    /// Engine or I/O failure (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {message}");
        }

        (
            status,
            Json(ErrorBody {
                status: "error",
                error: message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match &err {
            e if e.is_invalid_input() => Self::BadRequest(err.to_string()),
            StoreError::FileOpen { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                Self::NotFound(err.to_string())
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}
