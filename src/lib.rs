//! Connected mirror - keeps a local copy of an analysis server's state in sync.
//!
//! This library provides the core functionality for the `cmirror` CLI tool:
//! mirroring findings (issues, security hotspots, taint vulnerabilities),
//! analyzer plugins, quality profiles and server metadata for a bound project,
//! and translating between IDE-relative and server-relative file paths.

pub mod api;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod models;
pub mod paths;
pub mod storage;
pub mod sync;

pub use cancel::CancelToken;


/// Library-level error type for mirror operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The server answered `/api/system/status` with something other than UP.
    #[error("Server not ready ({0})")]
    ServerNotReady(String),

    /// A response body could not be understood. The raw payload is kept for diagnostics.
    #[error("Unexpected body for {context}: {payload}")]
    UnexpectedBody { context: String, payload: String },

    /// The server does not know the requested project, organization or resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any transport or parse failure while downloading data to mirror.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The operation was cancelled through its [`CancelToken`].
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error only means the operation was skipped because it was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Wrap a failure that happened while downloading into [`Error::DownloadFailed`].
    ///
    /// Cancellation and not-found errors are kept as they are so callers can tell
    /// them apart from generic transport failures.
    pub fn into_download_failure(self, context: &str) -> Error {
        match self {
            Error::Cancelled | Error::NotFound(_) | Error::DownloadFailed(_) => self,
            other => Error::DownloadFailed(format!("{}: {}", context, other)),
        }
    }
}

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, Error>;
