//! The frame pump: the per-session worker state machine.
//!
//! ```text
//! Connecting -> Streaming -> Reconnecting -> Streaming
//!     |             |              |
//!     +-------------+--------------+-------> Terminated
//! ```
//!
//! A failed initial connect never reaches `Streaming`; it is returned to the
//! caller of [`FramePump::connect`]. Once streaming, every failure is handled
//! inside [`FramePump::run`], which always ends in `Terminated` and returns a
//! [`PumpReport`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::command::spawn_post_command;
use crate::connection::{
    CloseCode, ConnectionManager, ConnectionStats, ReconnectOutcome, Reconnector, Transport,
};
use crate::descriptor::SessionDescriptor;
use crate::error::ConnectError;
use crate::frame::Frame;
use crate::lifecycle::WorkerLifecycle;
use crate::source::{FrameEvent, FrameSource};
use crate::types::SourceStatus;

/// State of a fork worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Opening the initial connection.
    Connecting,
    /// Forwarding frames.
    Streaming,
    /// Re-establishing the connection after a failed write.
    Reconnecting,
    /// Finished; only cleanup remains.
    Terminated,
}

/// Why a worker stopped streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The frame source reported a terminal status.
    SourceFinished(SourceStatus),
    /// The owner requested a stop.
    StopRequested,
    /// Every reconnection attempt failed.
    ReconnectExhausted,
    /// The connection came back but the retried frame could not be written.
    RetryWriteFailed,
}

impl TerminationReason {
    /// Check if the worker ended without a connection failure.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::SourceFinished(_) | Self::StopRequested)
    }

    fn close_code(&self) -> CloseCode {
        if self.is_clean() {
            CloseCode::Normal
        } else {
            CloseCode::Error
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFinished(status) => write!(f, "frame source {status:?}"),
            Self::StopRequested => f.write_str("stop requested"),
            Self::ReconnectExhausted => f.write_str("reconnection attempts exhausted"),
            Self::RetryWriteFailed => f.write_str("retried write failed"),
        }
    }
}

/// Final summary of a worker.
#[derive(Debug, Clone)]
pub struct PumpReport {
    /// Session the worker was attached to.
    pub session: String,
    /// Endpoint the frames were sent to.
    pub endpoint: Url,
    /// Frames taken from the source and delivered.
    pub frames_sent: u64,
    /// Why the worker stopped.
    pub reason: TerminationReason,
    /// Connection statistics at termination.
    pub stats: ConnectionStats,
}

/// Forwards frames from one source to one endpoint.
pub struct FramePump<T: Transport> {
    descriptor: Arc<SessionDescriptor>,
    manager: ConnectionManager<T>,
    reconnector: Reconnector,
    source: Arc<dyn FrameSource>,
    lifecycle: WorkerLifecycle,
    state: WorkerState,
    frames_sent: u64,
}

impl<T: Transport> FramePump<T> {
    /// Create a worker in the `Connecting` state. Does not connect.
    pub fn new(
        descriptor: Arc<SessionDescriptor>,
        transport: T,
        source: Arc<dyn FrameSource>,
        lifecycle: WorkerLifecycle,
    ) -> Self {
        let manager = ConnectionManager::new(
            transport,
            descriptor.endpoint().clone(),
            descriptor.connection().clone(),
        );
        Self {
            reconnector: Reconnector::new(descriptor.retry().clone()),
            descriptor,
            manager,
            source,
            lifecycle,
            state: WorkerState::Connecting,
            frames_sent: 0,
        }
    }

    /// Open the initial connection and move to `Streaming`.
    ///
    /// On failure the worker is torn down on the spot: the source is detached,
    /// destruction is acknowledged and no post-completion command runs.
    pub async fn connect(mut self) -> Result<Self, ConnectError> {
        debug_assert_eq!(self.state, WorkerState::Connecting);

        if let Err(e) = self.manager.connect().await {
            error!(endpoint = %self.descriptor.endpoint(), error = %e, "Initial connection failed");
            let Self {
                lifecycle, source, ..
            } = self;
            source.detach();
            lifecycle.acknowledge_destruction();
            return Err(e);
        }

        self.state = WorkerState::Streaming;
        Ok(self)
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The descriptor this worker runs with.
    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    /// Stream until the source ends, a stop is requested, or the connection
    /// is lost for good.
    pub async fn run(mut self) -> PumpReport {
        let direction = self.descriptor.direction();
        let poll = self.descriptor.frame_poll();
        info!(endpoint = %self.descriptor.endpoint(), %direction, "Streaming started");

        let reason = loop {
            if self.lifecycle.is_stop_requested() {
                break TerminationReason::StopRequested;
            }

            match self.source.next_frame(direction, poll).await {
                FrameEvent::NoFrameYet => continue,
                FrameEvent::StatusChanged(status) if !status.is_running() => {
                    break TerminationReason::SourceFinished(status);
                }
                FrameEvent::StatusChanged(_) => continue,
                FrameEvent::Frame(frame) => {
                    if let Err(reason) = self.forward(frame).await {
                        break reason;
                    }
                }
            }
        };

        self.terminate(reason).await
    }

    /// Write one frame, going through one reconnection episode on failure.
    async fn forward(&mut self, frame: Frame) -> Result<(), TerminationReason> {
        let err = match self.manager.write(&frame).await {
            Ok(()) => {
                self.frames_sent += 1;
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(error = %err, frames_sent = self.frames_sent, "Write failed, reconnecting");
        self.state = WorkerState::Reconnecting;

        match self.reconnector.reconnect_with_backoff(&mut self.manager).await {
            ReconnectOutcome::Recovered { attempts } => {
                debug!(attempts, "Retrying failed frame");
                match self.manager.write(&frame).await {
                    Ok(()) => {
                        self.frames_sent += 1;
                        self.state = WorkerState::Streaming;
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "Retried write failed");
                        Err(TerminationReason::RetryWriteFailed)
                    }
                }
            }
            ReconnectOutcome::ExhaustedAttempts { attempts } => {
                error!(attempts, "Giving up on endpoint");
                Err(TerminationReason::ReconnectExhausted)
            }
        }
    }

    async fn terminate(mut self, reason: TerminationReason) -> PumpReport {
        self.state = WorkerState::Terminated;

        if self.descriptor.beep().on_stop {
            self.source.play_beep();
        }
        self.source.detach();
        self.manager.close(reason.close_code()).await;

        if let Some(command) = self.descriptor.post_command() {
            spawn_post_command(command.to_string());
        }

        if reason.is_clean() {
            info!(frames_sent = self.frames_sent, %reason, "Audio fork finished");
        } else {
            error!(frames_sent = self.frames_sent, %reason, "Audio fork terminated");
        }

        let report = PumpReport {
            session: self.descriptor.session_name().to_string(),
            endpoint: self.descriptor.endpoint().clone(),
            frames_sent: self.frames_sent,
            reason,
            stats: self.manager.stats().clone(),
        };

        let Self {
            lifecycle, source, ..
        } = self;
        lifecycle.acknowledge_destruction();
        drop(source);
        report
    }
}

impl<T: Transport> fmt::Debug for FramePump<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePump")
            .field("session", &self.descriptor.session_name())
            .field("state", &self.state)
            .field("frames_sent", &self.frames_sent)
            .field("manager", &self.manager)
            .finish()
    }
}
