//! Error types for the herald playback core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for playback operations
pub type HeraldResult<T> = Result<T, HeraldError>;

/// Errors that can occur in the playback orchestration core
#[derive(Error, Debug)]
pub enum HeraldError {
    /// Invalid startup configuration. Fatal; never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level connection failure. Recoverable; the connection
    /// manager retries on its own schedule.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The configured destination (guild or channel) could not be resolved.
    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),

    /// A sink failed to start. The session degrades to the remaining sinks.
    #[error("Sink failed to start: {0}")]
    SinkStart(String),

    /// Artifact file deletion failed. Logged; the file stays on disk for
    /// manual cleanup.
    #[error("Cleanup failed for {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem watch error: {0}")]
    Watch(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
