//! Transport abstraction between the connection manager and the wire.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::{ConnectError, WriteError};

use super::config::ConnectionConfig;

/// Status code sent when closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// The fork finished cleanly (1000).
    Normal,
    /// The connection is being abandoned after a failure (1011).
    Error,
}

impl CloseCode {
    /// Numeric WebSocket close code.
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Error => 1011,
        }
    }
}

/// Opens links to a remote endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The live connection type.
    type Link: Link;

    /// Open a new link. Must not leave partial state behind on failure.
    async fn open(&self, endpoint: &Url, config: &ConnectionConfig) -> Result<Self::Link, ConnectError>;
}

/// One live connection carrying discrete binary messages.
#[async_trait]
pub trait Link: Send {
    /// Send one frame as exactly one binary message. Never retries.
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), WriteError>;

    /// Close the link with the given status code.
    async fn close(&mut self, code: CloseCode) -> Result<(), WriteError>;
}
