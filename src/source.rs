//! The frame source: the media pipeline a fork is attached to.
//!
//! The pipeline itself lives outside this crate. [`FrameSource`] is the
//! boundary the worker talks to. [`ChannelFrameSource`] is an in-memory
//! implementation fed through a [`FrameFeeder`], suitable for bridging an
//! existing pipeline or for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::time::{Instant, sleep_until};

use crate::frame::Frame;
use crate::types::{Direction, SourceStatus, VolumeAdjust};

/// Result of waiting for the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A frame for the requested direction.
    Frame(Frame),
    /// Nothing arrived before the timeout.
    NoFrameYet,
    /// The source status changed while waiting.
    StatusChanged(SourceStatus),
}

/// A live audio stream a fork can be attached to.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Human-readable identity of the session (e.g. the channel name).
    fn identity(&self) -> String;

    /// Wait up to `timeout` for the next frame matching `direction`.
    async fn next_frame(&self, direction: Direction, timeout: Duration) -> FrameEvent;

    /// Current lifecycle status.
    fn status(&self) -> SourceStatus;

    /// Ask the source to stop handing out frames and wake any waiter.
    fn request_shutdown(&self);

    /// Apply per-leg volume levels to future frames.
    ///
    /// Frames tagged [`Direction::Both`] are already mixed, so they get the
    /// average of the two levels.
    fn apply_volume_adjust(&self, adjust: VolumeAdjust);

    /// Mute or unmute a leg. Muted legs yield silence of the same length.
    ///
    /// A mixed [`Direction::Both`] frame cannot be split, so it is silenced
    /// whenever either leg is muted.
    fn apply_mute(&self, direction: Direction, on: bool);

    /// Play a notification beep to the session.
    fn play_beep(&self) {}

    /// Release the fork's attachment to the source.
    fn detach(&self) {}
}

#[derive(Debug, Default)]
struct MuteFlags {
    read: bool,
    write: bool,
}

impl MuteFlags {
    fn set(&mut self, direction: Direction, on: bool) {
        if direction.includes_read() {
            self.read = on;
        }
        if direction.includes_write() {
            self.write = on;
        }
    }

    fn mutes(&self, direction: Direction) -> bool {
        match direction {
            Direction::In => self.read,
            Direction::Out => self.write,
            Direction::Both => self.read || self.write,
        }
    }
}

/// State shared between a [`ChannelFrameSource`] and its feeder.
#[derive(Debug)]
struct Shared {
    status: Mutex<SourceStatus>,
    changed: Notify,
    mute: Mutex<MuteFlags>,
    volume: Mutex<VolumeAdjust>,
    beeps: AtomicUsize,
    detached: AtomicBool,
}

impl Shared {
    fn status(&self) -> SourceStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: SourceStatus) {
        let mut current = self.status.lock();
        // Done is final.
        if *current != SourceStatus::Done {
            *current = status;
        }
        drop(current);
        self.changed.notify_one();
    }
}

/// Create an in-memory frame source and the feeder that pushes frames into it.
pub fn channel_source(
    identity: impl Into<String>,
    capacity: usize,
) -> (FrameFeeder, ChannelFrameSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared {
        status: Mutex::new(SourceStatus::Running),
        changed: Notify::new(),
        mute: Mutex::new(MuteFlags::default()),
        volume: Mutex::new(VolumeAdjust::default()),
        beeps: AtomicUsize::new(0),
        detached: AtomicBool::new(false),
    });

    let feeder = FrameFeeder {
        tx,
        shared: shared.clone(),
    };
    let source = ChannelFrameSource {
        identity: identity.into(),
        rx: AsyncMutex::new(rx),
        shared,
    };
    (feeder, source)
}

/// Producer side of a [`ChannelFrameSource`].
#[derive(Debug)]
pub struct FrameFeeder {
    tx: mpsc::Sender<Frame>,
    shared: Arc<Shared>,
}

impl FrameFeeder {
    /// Push a frame, waiting for buffer space.
    ///
    /// Returns the frame back if the source no longer accepts frames.
    pub async fn send(&self, frame: Frame) -> Result<(), Frame> {
        if !self.shared.status().is_running() {
            return Err(frame);
        }
        self.tx.send(frame).await.map_err(|e| e.0)
    }

    /// Current status of the source.
    pub fn status(&self) -> SourceStatus {
        self.shared.status()
    }

    /// Number of beeps played so far.
    pub fn beeps(&self) -> usize {
        self.shared.beeps.load(Ordering::Acquire)
    }

    /// Check if the fork released its attachment.
    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::Acquire)
    }

    /// End the session. Frames already buffered are still delivered.
    pub fn finish(self) {
        drop(self.tx);
        self.shared.changed.notify_one();
    }
}

/// Frame source backed by a bounded channel.
#[derive(Debug)]
pub struct ChannelFrameSource {
    identity: String,
    rx: AsyncMutex<mpsc::Receiver<Frame>>,
    shared: Arc<Shared>,
}

impl ChannelFrameSource {
    /// Apply mute and volume settings to a frame leaving the source.
    fn shape(&self, frame: Frame) -> Frame {
        if self.shared.mute.lock().mutes(frame.direction()) {
            return frame.silenced();
        }

        let factor = self.shared.volume.lock().factor_for(frame.direction());
        frame.with_volume(factor)
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn next_frame(&self, direction: Direction, timeout: Duration) -> FrameEvent {
        let deadline = Instant::now() + timeout;
        let mut rx = self.rx.lock().await;

        loop {
            let status = self.shared.status();
            if !status.is_running() {
                return FrameEvent::StatusChanged(status);
            }

            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Some(frame) if direction.accepts(frame.direction()) => {
                        return FrameEvent::Frame(self.shape(frame));
                    }
                    Some(_) => continue,
                    None => {
                        self.shared.set_status(SourceStatus::Done);
                        return FrameEvent::StatusChanged(SourceStatus::Done);
                    }
                },
                _ = self.shared.changed.notified() => continue,
                _ = sleep_until(deadline) => return FrameEvent::NoFrameYet,
            }
        }
    }

    fn status(&self) -> SourceStatus {
        self.shared.status()
    }

    fn request_shutdown(&self) {
        self.shared.set_status(SourceStatus::ShuttingDown);
    }

    fn apply_volume_adjust(&self, adjust: VolumeAdjust) {
        *self.shared.volume.lock() = adjust;
    }

    fn apply_mute(&self, direction: Direction, on: bool) {
        self.shared.mute.lock().set(direction, on);
    }

    fn play_beep(&self) {
        self.shared.beeps.fetch_add(1, Ordering::AcqRel);
    }

    fn detach(&self) {
        self.shared.detached.store(true, Ordering::Release);
    }
}
