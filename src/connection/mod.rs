//! Connection management for audio forks.
//!
//! This module provides:
//! - A connection manager owning a single outbound link
//! - Bounded, fixed-interval reconnection
//! - Configuration for retries, timeouts and TLS
//! - A WebSocket transport
//!
//! # Example
//!
//! ```no_run
//! use audiofork_rs::connection::{
//!     ConnectionConfig, ConnectionManager, Reconnector, RetryPolicy, WsTransport,
//! };
//! use std::time::Duration;
//! use url::Url;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Url::parse("ws://127.0.0.1:8080/audio")?;
//! let mut manager = ConnectionManager::new(WsTransport::new(), endpoint, ConnectionConfig::default());
//! manager.connect().await?;
//!
//! // After a write failure, try to get the link back.
//! let mut reconnector = Reconnector::new(RetryPolicy::fixed(3, Duration::from_secs(5)));
//! let outcome = reconnector.reconnect_with_backoff(&mut manager).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod config;
mod manager;
mod reconnect;
mod state;
mod transport;
mod ws;

pub use config::{
    ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL,
    DEFAULT_WRITE_TIMEOUT, RetryPolicy, TlsConfig,
};
pub use manager::{ConnectionHandle, ConnectionManager};
pub use reconnect::{ReconnectOutcome, Reconnector};
pub use state::{ConnectionState, ConnectionStats};
pub use transport::{CloseCode, Link, Transport};
pub use ws::{WsLink, WsTransport};
