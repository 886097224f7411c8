//! Real-time audio forking to WebSocket endpoints, built on tokio.
//!
//! This crate forwards the audio of a live session, frame by frame, to a
//! remote WebSocket endpoint while the session keeps running. Each fork is a
//! background worker owning one outbound connection.
//!
//! # Features
//!
//! - One binary message per audio frame, in order, never split or merged
//! - Bounded, fixed-interval reconnection with a single retried frame
//! - Cooperative stop with a destruction handshake for race-free teardown
//! - `ws://` and `wss://` endpoints, with optional peer verification
//! - Per-leg direction, mute and volume control
//! - Post-completion shell command with variable substitution
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use audiofork_rs::{Direction, ForkRegistry, SessionDescriptor, channel_source};
//!
//! # async fn run() -> audiofork_rs::Result<()> {
//! let registry = ForkRegistry::websocket();
//! let (feeder, source) = channel_source("SIP/alice-00000001", 64);
//!
//! let descriptor = SessionDescriptor::builder("ws://127.0.0.1:8080/audio")
//!     .with_direction(Direction::In)
//!     .build_for(&source)?;
//!
//! let id = registry.start(descriptor, Arc::new(source)).await?;
//! println!("fork {id} started");
//!
//! // Feed frames through `feeder`, then end the session.
//! feeder.finish();
//! let report = registry.join(id).await?;
//! println!("{} frames sent", report.frames_sent);
//! # Ok(())
//! # }
//! ```
//!
//! # Worker lifecycle
//!
//! ```text
//! start() --> Connecting --ok--> Streaming <------------+
//!                 |                 |                   |
//!               error          write failed        recovered and
//!                 |                 v              retry succeeded
//!                 v            Reconnecting ------------+
//!          start() fails            |
//!                              exhausted or retry failed
//!                                   v
//!                              Terminated --> beep, close, post command, ack
//! ```

pub mod command;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod pump;
pub mod registry;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types at the crate root
pub use connection::{ConnectionConfig, RetryPolicy, TlsConfig};
pub use descriptor::{BeepOptions, DescriptorBuilder, SessionDescriptor};
pub use error::{ConnectError, ForkError, Result, WriteError};
pub use frame::Frame;
pub use lifecycle::{StopHandle, WorkerLifecycle, lifecycle};
pub use pump::{FramePump, PumpReport, TerminationReason, WorkerState};
pub use registry::{ForkRegistry, WorkerInfo};
pub use source::{ChannelFrameSource, FrameEvent, FrameFeeder, FrameSource, channel_source};
pub use types::{Direction, SAMPLES_PER_FRAME, SourceStatus, VolumeAdjust, WorkerId};
