//! Error types and Result aliases for the hotfolder engine.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Folder descriptor store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Control channel error.
    #[error("control channel error: {0}")]
    Control(#[from] ControlError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation requires a running manager.
    #[error("manager is not running")]
    NotRunning,

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Folder descriptor store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing file could not be read.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Backing file could not be written.
    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },

    /// Backing file is not a valid folder list.
    #[error("failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Input path does not exist.
    #[error("input path '{path}' does not exist")]
    PathMissing { path: String },

    /// A watch already exists for this id.
    #[error("hotfolder '{id}' is already watched")]
    AlreadyWatched { id: String },

    /// The input path is already watched under another id.
    #[error("input path '{path}' is already watched by hotfolder '{id}'")]
    PathInUse { path: String, id: String },

    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// A file pattern is not a valid glob.
    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The folder's tracker task is no longer running.
    #[error("tracker for hotfolder '{id}' has stopped")]
    TrackerGone { id: String },
}

/// Control channel errors.
///
/// `NotRunning`, `Busy` and `NoResponse` are the three outcomes a client
/// can observe; they are kept distinct so callers can tell an absent
/// service from an overloaded one.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Nothing is listening on the endpoint.
    #[error("service not running at '{path}': {reason}")]
    NotRunning { path: String, reason: String },

    /// The endpoint exists but did not accept the connection in time.
    #[error("service busy: {reason}")]
    Busy { reason: String },

    /// The connection was accepted but no response arrived.
    #[error("no response from service: {reason}")]
    NoResponse { reason: String },

    /// Malformed frame or payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failed to bind the listener.
    #[error("failed to bind '{path}': {reason}")]
    Bind { path: String, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests;
