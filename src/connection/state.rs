//! Connection state management.

use std::time::{Duration, Instant};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected, or the last write failed.
    #[default]
    Disconnected,
    /// Connected and ready.
    Connected,
}

impl ConnectionState {
    /// Check if the connection is usable.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Number of successful connections.
    pub connect_count: u64,
    /// Number of failed connect attempts and writes.
    pub failure_count: u64,
    /// Number of connect attempts that replaced an earlier connection.
    pub reconnect_count: u64,
    /// Number of frames sent.
    pub frames_sent: u64,
    /// Total bytes sent.
    pub bytes_sent: u64,
    /// Time of last successful connection.
    pub last_connected: Option<Instant>,
    /// Time of last disconnect.
    pub last_disconnected: Option<Instant>,
    /// Time of last error.
    pub last_error: Option<Instant>,
}

impl ConnectionStats {
    /// Record a successful connection.
    pub fn record_connect(&mut self) {
        self.connect_count += 1;
        self.last_connected = Some(Instant::now());
    }

    /// Record a disconnection.
    pub fn record_disconnect(&mut self) {
        self.last_disconnected = Some(Instant::now());
    }

    /// Record a failure.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_error = Some(Instant::now());
    }

    /// Record a reconnection attempt.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
    }

    /// Record a sent frame.
    pub fn record_send(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Time since the last successful connection.
    pub fn uptime(&self) -> Option<Duration> {
        self.last_connected.map(|t| t.elapsed())
    }
}
