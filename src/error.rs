//! Error types for audio fork operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::types::WorkerId;

/// Errors raised while opening a connection to the remote endpoint.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The endpoint could not be turned into a WebSocket request.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Network-level failure (unreachable, refused, reset).
    #[error("Network error: {0}")]
    Io(#[from] io::Error),

    /// The WebSocket upgrade was rejected or broke mid-way.
    #[error("Handshake with {endpoint} failed: {reason}")]
    Handshake { endpoint: String, reason: String },

    /// TLS material could not be loaded or the TLS session failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The attempt did not complete in time.
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl ConnectError {
    /// Create a handshake error for the given endpoint.
    pub fn handshake(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handshake {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while writing a frame to an open connection.
#[derive(Error, Debug)]
pub enum WriteError {
    /// No connection is currently open.
    #[error("Not connected")]
    NotConnected,

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The write did not complete in time.
    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced to the control plane.
#[derive(Error, Debug)]
pub enum ForkError {
    /// The session descriptor was rejected before launch.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The initial connection failed; no worker was started.
    #[error("Could not connect: {0}")]
    Connect(#[from] ConnectError),

    /// A write failed.
    #[error("Could not write: {0}")]
    Write(#[from] WriteError),

    /// The post-completion command failed to run or exited unsuccessfully.
    #[error("Post-completion command failed: {0}")]
    PostCommand(String),

    /// No live worker with this identifier.
    #[error("No audio fork with id {0}")]
    UnknownWorker(WorkerId),

    /// Attribute key not understood by `query_attribute`.
    #[error("Unrecognized attribute '{0}'")]
    UnknownAttribute(String),

    /// The frame source was no longer running when the fork was requested.
    #[error("Frame source is not running")]
    SourceNotRunning,

    /// The registry was shut down and accepts no new workers.
    #[error("Registry is shut down")]
    RegistryClosed,

    /// The worker task ended abnormally.
    #[error("Worker aborted: {0}")]
    WorkerAborted(String),
}

/// Result type alias for audio fork operations.
pub type Result<T> = std::result::Result<T, ForkError>;

impl ForkError {
    /// Create a new configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this error is handled by reconnecting rather than shutting down.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}
