//! Connection manager owning the single outbound link of a fork.

use std::time::Instant;

use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ConnectError, WriteError};
use crate::frame::Frame;

use super::config::ConnectionConfig;
use super::state::{ConnectionState, ConnectionStats};
use super::transport::{CloseCode, Link, Transport};

/// A live link plus its state. Replaced, never reused, on reconnect.
#[derive(Debug)]
pub struct ConnectionHandle<L> {
    link: L,
    state: ConnectionState,
    generation: u64,
    opened_at: Instant,
}

impl<L> ConnectionHandle<L> {
    /// Current state of this handle.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sequence number of this handle; 1 for the first connection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the link was opened.
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

/// Opens, writes to, and closes the connection to one endpoint.
///
/// At most one link is live at a time: a reconnect closes the previous
/// link before dialing again.
pub struct ConnectionManager<T: Transport> {
    /// Transport used to open links.
    transport: T,
    /// Target endpoint.
    endpoint: Url,
    /// Connection configuration.
    config: ConnectionConfig,
    /// Active connection.
    handle: Option<ConnectionHandle<T::Link>>,
    /// Number of links opened so far.
    generation: u64,
    /// Connection statistics.
    stats: ConnectionStats,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager for the given endpoint. Does not connect.
    pub fn new(transport: T, endpoint: Url, config: ConnectionConfig) -> Self {
        Self {
            transport,
            endpoint,
            config,
            handle: None,
            generation: 0,
            stats: ConnectionStats::default(),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map_or(ConnectionState::Disconnected, |h| h.state)
    }

    /// Check if the manager holds a usable link.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the current handle, if any.
    pub fn handle(&self) -> Option<&ConnectionHandle<T::Link>> {
        self.handle.as_ref()
    }

    /// Get connection statistics.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Get the target endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Open a new link, closing and releasing any existing one first.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if let Some(old) = self.handle.take() {
            info!(endpoint = %self.endpoint, "Reconnecting WebSocket server");
            self.stats.record_reconnect();
            self.release(old, CloseCode::Error).await;
        } else {
            info!(endpoint = %self.endpoint, "Connecting WebSocket server");
        }

        let tls = self.config.tls.is_some();
        debug!(tls, "Creating WebSocket connection");

        let result = match timeout(
            self.config.connect_timeout,
            self.transport.open(&self.endpoint, &self.config),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(self.config.connect_timeout)),
        };

        match result {
            Ok(link) => {
                self.generation += 1;
                self.handle = Some(ConnectionHandle {
                    link,
                    state: ConnectionState::Connected,
                    generation: self.generation,
                    opened_at: Instant::now(),
                });
                self.stats.record_connect();
                info!(generation = self.generation, "Connected");
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    /// Send one frame as one message.
    ///
    /// A failure marks the handle disconnected; retrying is the caller's job.
    pub async fn write(&mut self, frame: &Frame) -> Result<(), WriteError> {
        let handle = match self.handle.as_mut() {
            Some(handle) if handle.state.is_connected() => handle,
            _ => return Err(WriteError::NotConnected),
        };

        let result = match timeout(
            self.config.write_timeout,
            handle.link.send_frame(frame.payload().clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WriteError::Timeout(self.config.write_timeout)),
        };

        match result {
            Ok(()) => {
                self.stats.record_send(frame.len());
                Ok(())
            }
            Err(e) => {
                handle.state = ConnectionState::Disconnected;
                self.stats.record_failure();
                self.stats.record_disconnect();
                Err(e)
            }
        }
    }

    /// Close the current link, if any.
    pub async fn close(&mut self, code: CloseCode) {
        match self.handle.take() {
            Some(handle) => {
                info!(code = code.as_u16(), "Closing WebSocket connection");
                self.release(handle, code).await;
            }
            None => debug!("No open connection to close"),
        }
    }

    async fn release(&mut self, mut handle: ConnectionHandle<T::Link>, code: CloseCode) {
        match timeout(self.config.write_timeout, handle.link.close(code)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Close failed"),
            Err(_) => warn!(timeout = ?self.config.write_timeout, "Close timed out"),
        }
        if handle.state.is_connected() {
            self.stats.record_disconnect();
        }
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, ScriptedTransport};
    use crate::types::Direction;
    use bytes::Bytes;

    fn manager(transport: &ScriptedTransport) -> ConnectionManager<ScriptedTransport> {
        ConnectionManager::new(
            transport.clone(),
            Url::parse("ws://127.0.0.1:9/fork").unwrap(),
            ConnectionConfig::default(),
        )
    }

    fn frame(value: u8) -> Frame {
        Frame::new(Direction::Both, Bytes::from(vec![value, 0]))
    }

    #[tokio::test]
    async fn test_write_without_connection() {
        let transport = ScriptedTransport::new();
        let mut manager = manager(&transport);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            manager.write(&frame(1)).await,
            Err(WriteError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_and_write() {
        let transport = ScriptedTransport::new();
        let mut manager = manager(&transport);

        manager.connect().await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(manager.handle().unwrap().generation(), 1);

        manager.write(&frame(1)).await.unwrap();
        manager.write(&frame(2)).await.unwrap();
        assert_eq!(transport.sent(), vec![frame(1).into_payload(), frame(2).into_payload()]);
        assert_eq!(manager.stats().frames_sent, 2);
        assert_eq!(manager.stats().bytes_sent, 4);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_handle() {
        let transport = ScriptedTransport::new();
        transport.fail_connects(1);
        let mut manager = manager(&transport);

        assert!(manager.connect().await.is_err());
        assert!(manager.handle().is_none());
        assert_eq!(manager.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn test_write_failure_marks_disconnected() {
        let transport = ScriptedTransport::new();
        transport.push_link_budget(Some(1));
        let mut manager = manager(&transport);

        manager.connect().await.unwrap();
        manager.write(&frame(1)).await.unwrap();
        assert!(manager.write(&frame(2)).await.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            manager.write(&frame(3)).await,
            Err(WriteError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reconnect_closes_old_link_first() {
        let transport = ScriptedTransport::new();
        let mut manager = manager(&transport);

        manager.connect().await.unwrap();
        manager.connect().await.unwrap();

        assert_eq!(
            transport.events(),
            vec![
                Event::Open(1),
                Event::Close(1, CloseCode::Error),
                Event::Open(2),
            ]
        );
        assert_eq!(manager.handle().unwrap().generation(), 2);
        assert_eq!(manager.stats().reconnect_count, 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = ScriptedTransport::new();
        let mut manager = manager(&transport);

        manager.connect().await.unwrap();
        manager.close(CloseCode::Normal).await;
        manager.close(CloseCode::Normal).await;

        assert_eq!(
            transport.events(),
            vec![Event::Open(1), Event::Close(1, CloseCode::Normal)]
        );
        assert!(!manager.is_connected());
    }
}
