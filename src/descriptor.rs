//! Session descriptor: the immutable configuration of one fork.

use std::time::Duration;

use url::Url;

use crate::command::substitute_variables;
use crate::connection::{ConnectionConfig, RetryPolicy, TlsConfig};
use crate::error::{ForkError, Result};
use crate::source::FrameSource;
use crate::types::{Direction, VolumeAdjust};

/// Default wait for the next frame before re-checking for a stop request.
pub const DEFAULT_FRAME_POLL: Duration = Duration::from_millis(200);

/// Notification beeps played on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeepOptions {
    /// Beep when the fork starts.
    pub on_start: bool,
    /// Beep when the fork stops.
    pub on_stop: bool,
}

/// Validated, immutable fork configuration.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    endpoint: Url,
    direction: Direction,
    connection: ConnectionConfig,
    retry: RetryPolicy,
    post_command: Option<String>,
    volume: VolumeAdjust,
    beep: BeepOptions,
    frame_poll: Duration,
    session_name: String,
}

impl SessionDescriptor {
    /// Start building a descriptor for the given endpoint URL.
    pub fn builder(endpoint: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(endpoint)
    }

    /// Remote WebSocket endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Forwarded leg(s).
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Connection settings, including TLS.
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// TLS settings, if the endpoint is secure.
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.connection.tls.as_ref()
    }

    /// Reconnection policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Command to run after the fork ends, variables already expanded.
    pub fn post_command(&self) -> Option<&str> {
        self.post_command.as_deref()
    }

    /// Volume levels applied to the source.
    pub fn volume(&self) -> VolumeAdjust {
        self.volume
    }

    /// Beep notifications.
    pub fn beep(&self) -> BeepOptions {
        self.beep
    }

    /// Maximum wait for one frame.
    pub fn frame_poll(&self) -> Duration {
        self.frame_poll
    }

    /// Name of the session the fork is attached to.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }
}

/// Builder for [`SessionDescriptor`]. Validation happens in [`Self::build`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    endpoint: String,
    direction: Direction,
    connection: ConnectionConfig,
    retry: RetryPolicy,
    post_command: Option<String>,
    volume: VolumeAdjust,
    beep: BeepOptions,
    frame_poll: Duration,
}

impl DescriptorBuilder {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            direction: Direction::default(),
            connection: ConnectionConfig::default(),
            retry: RetryPolicy::default(),
            post_command: None,
            volume: VolumeAdjust::default(),
            beep: BeepOptions::default(),
            frame_poll: DEFAULT_FRAME_POLL,
        }
    }

    /// Set the forwarded leg(s).
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Replace the connection settings.
    pub fn with_connection(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Use TLS with the given settings.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.connection.tls = Some(tls);
        self
    }

    /// Set the reconnection policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set reconnection attempts and interval.
    pub fn with_reconnect(self, max_attempts: u32, interval: Duration) -> Self {
        self.with_retry(RetryPolicy::fixed(max_attempts, interval))
    }

    /// Set the post-completion command, expanding variables now.
    pub fn with_post_command<F>(mut self, template: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let command = substitute_variables(template, lookup);
        self.post_command = (!command.trim().is_empty()).then_some(command);
        self
    }

    /// Set volume levels.
    pub fn with_volume(mut self, volume: VolumeAdjust) -> Self {
        self.volume = volume;
        self
    }

    /// Set beep notifications.
    pub fn with_beep(mut self, beep: BeepOptions) -> Self {
        self.beep = beep;
        self
    }

    /// Set the maximum wait for one frame.
    pub fn with_frame_poll(mut self, poll: Duration) -> Self {
        self.frame_poll = poll;
        self
    }

    /// Validate and build, naming the session after `source`.
    pub fn build_for(self, source: &dyn FrameSource) -> Result<SessionDescriptor> {
        let name = source.identity();
        self.build(name)
    }

    /// Validate and build.
    pub fn build(mut self, session_name: impl Into<String>) -> Result<SessionDescriptor> {
        if self.endpoint.trim().is_empty() {
            return Err(ForkError::invalid_config("missing endpoint"));
        }

        let endpoint = Url::parse(self.endpoint.trim()).map_err(|e| {
            ForkError::invalid_config(format!("malformed endpoint '{}': {e}", self.endpoint))
        })?;

        match endpoint.scheme() {
            "wss" => {
                if self.connection.tls.is_none() {
                    self.connection.tls = Some(TlsConfig::default());
                }
            }
            "ws" => {
                if self.connection.tls.is_some() {
                    return Err(ForkError::invalid_config(format!(
                        "TLS configured for unencrypted endpoint '{endpoint}'"
                    )));
                }
            }
            other => {
                return Err(ForkError::invalid_config(format!(
                    "unsupported endpoint scheme '{other}', expected ws or wss"
                )));
            }
        }

        if self.retry.interval.is_zero() {
            return Err(ForkError::invalid_config("retry interval must be positive"));
        }
        if self.connection.connect_timeout.is_zero() || self.connection.write_timeout.is_zero() {
            return Err(ForkError::invalid_config("timeouts must be positive"));
        }
        if self.frame_poll.is_zero() {
            return Err(ForkError::invalid_config("frame poll interval must be positive"));
        }

        Ok(SessionDescriptor {
            endpoint,
            direction: self.direction,
            connection: self.connection,
            retry: self.retry,
            post_command: self.post_command,
            volume: self.volume,
            beep: self.beep,
            frame_poll: self.frame_poll,
            session_name: session_name.into(),
        })
    }
}
