//! Connection management configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Default wait between reconnection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of reconnection attempts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-interval, bounded-attempt reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of reconnection attempts. Zero disables reconnection.
    pub max_attempts: u32,
    /// Minimum time between the starts of two consecutive attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no reconnection attempts.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delay retries.
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Check if another attempt should be made after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Attempts left after `attempt` attempts.
    pub fn remaining(&self, attempt: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt)
    }
}

/// TLS settings for secure WebSocket endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Verify the server certificate chain and name.
    pub verify_peer: bool,
    /// Extra PEM file with trusted CA certificates.
    pub ca_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_peer: true,
            ca_file: None,
        }
    }
}

impl TlsConfig {
    /// Encrypt without verifying the server certificate.
    pub fn insecure() -> Self {
        Self {
            verify_peer: false,
            ca_file: None,
        }
    }

    /// Trust the certificates in `path` in addition to the bundled roots.
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Enable or disable peer verification.
    pub fn with_verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// TLS settings. `None` means an unencrypted connection.
    pub tls: Option<TlsConfig>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for writing one frame.
    pub write_timeout: Duration,
    /// Value of the `Sec-WebSocket-Protocol` request header.
    pub subprotocol: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tls: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            subprotocol: None,
        }
    }
}

impl ConnectionConfig {
    /// Set the TLS configuration.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Request a WebSocket subprotocol.
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }
}
