//! Error types for threadcast.
//!
//! Each subsystem has its own error enum; [`Error`] is the process-level
//! union. Only a small set of failures is allowed to reach the process
//! boundary: an unusable corpus, a missing or corrupt session, and an empty
//! channel pool. Dispatch failures inside a running pool are deliberately
//! absent from [`Error`]; the supervisor absorbs them and rebuilds.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type. Anything of this type terminates the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Message-corpus parsing errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("no usable messages in input (only separators or blank content)")]
    NoMessages,

    #[error("failed to read corpus file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Session blob errors. Fatal at startup when a session is expected.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file not found: {path}")]
    Missing { path: PathBuf },

    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("login failed: {reason}")]
    LoginFailed { reason: String },
}

/// Channel-pool errors. Only the empty pool is fatal; individual channel
/// initialization failures are absorbed by the pool builder.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no channel survived initialization, nothing to run")]
    Empty,
}

/// A single channel's failure to become ready after all attempts.
///
/// Logged and absorbed by the pool builder; never escalates past it.
#[derive(Debug, thiserror::Error)]
#[error("channel for {target} (tab {tab}) failed after {attempts} attempts: {source}")]
pub struct InitError {
    pub target: String,
    pub tab: usize,
    pub attempts: u32,
    #[source]
    pub source: SurfaceError,
}

/// Failures of a single remote-interaction call.
///
/// A timeout is treated identically to any other failure of the call that
/// timed out; the variant only exists so logs can say which bound tripped.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("navigation failed: {reason}")]
    Navigation { reason: String },

    #[error("element not found for selector {selector:?}")]
    ElementNotFound { selector: String },

    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    #[error("surface handle is closed")]
    Closed,
}

/// Result type alias for process-fatal paths.
pub type Result<T> = std::result::Result<T, Error>;
