//! Control plane: the table of running forks.
//!
//! A [`ForkRegistry`] is created at process start and shut down at process
//! stop. It owns one control entry per worker and is the only way the outside
//! world reaches a running fork: start, stop, list, mute and attribute queries
//! all go through it, keyed by [`WorkerId`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::connection::{Transport, WsTransport};
use crate::descriptor::SessionDescriptor;
use crate::error::{ForkError, Result};
use crate::lifecycle::{StopHandle, lifecycle};
use crate::pump::{FramePump, PumpReport};
use crate::source::FrameSource;
use crate::types::{Direction, WorkerId};

/// Public view of a running fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Worker identifier.
    pub id: WorkerId,
    /// Session the fork is attached to.
    pub session: String,
    /// Endpoint the audio goes to.
    pub endpoint: Url,
    /// Forwarded leg(s).
    pub direction: Direction,
}

/// Control entry for one worker.
struct WorkerControl {
    descriptor: Arc<SessionDescriptor>,
    source: Arc<dyn FrameSource>,
    stop: StopHandle,
    task: Option<JoinHandle<PumpReport>>,
}

impl WorkerControl {
    /// A worker is live until it acknowledges destruction.
    fn is_live(&self) -> bool {
        !self.stop.is_acknowledged()
    }

    fn reapable(&self) -> bool {
        self.task.as_ref().is_some_and(|t| t.is_finished())
    }

    fn signal_stop(&self) -> bool {
        let first = self.stop.request_stop();
        self.source.request_shutdown();
        first
    }

    fn info(&self, id: WorkerId) -> WorkerInfo {
        WorkerInfo {
            id,
            session: self.descriptor.session_name().to_string(),
            endpoint: self.descriptor.endpoint().clone(),
            direction: self.descriptor.direction(),
        }
    }
}

struct Inner<T> {
    transport: T,
    workers: Mutex<HashMap<WorkerId, WorkerControl>>,
    closed: AtomicBool,
}

/// Registry of running audio forks.
///
/// Cloning is cheap; clones share the same table.
pub struct ForkRegistry<T: Transport = WsTransport> {
    inner: Arc<Inner<T>>,
}

impl ForkRegistry<WsTransport> {
    /// Create a registry sending audio over WebSocket.
    pub fn websocket() -> Self {
        Self::new(WsTransport::new())
    }
}

impl<T> ForkRegistry<T>
where
    T: Transport + Clone + 'static,
{
    /// Create a registry using the given transport for every worker.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                workers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Start forking `source` to the descriptor's endpoint.
    ///
    /// Returns once the initial connection is up and the worker is running.
    /// If the initial connection fails no worker is created.
    pub async fn start(
        &self,
        descriptor: SessionDescriptor,
        source: Arc<dyn FrameSource>,
    ) -> Result<WorkerId> {
        if self.is_closed() {
            return Err(ForkError::RegistryClosed);
        }
        if !source.status().is_running() {
            return Err(ForkError::SourceNotRunning);
        }

        let descriptor = Arc::new(descriptor);
        let id = WorkerId::new();
        let span = info_span!(
            "audiofork",
            id = %id,
            session = %descriptor.session_name(),
            direction = %descriptor.direction(),
        );

        if descriptor.beep().on_start {
            source.play_beep();
        }
        if !descriptor.volume().is_neutral() {
            source.apply_volume_adjust(descriptor.volume());
        }

        let (stop, worker) = lifecycle();
        let pump = FramePump::new(
            descriptor.clone(),
            self.inner.transport.clone(),
            source.clone(),
            worker,
        )
        .connect()
        .instrument(span.clone())
        .await?;

        let task = tokio::spawn(pump.run().instrument(span.clone()));
        let control = WorkerControl {
            descriptor,
            source,
            stop,
            task: Some(task),
        };

        {
            let mut workers = self.inner.workers.lock();
            if !self.is_closed() {
                workers.retain(|_, w| !w.reapable());
                workers.insert(id, control);
                span.in_scope(|| info!("Audio fork started"));
                return Ok(id);
            }
        }

        // Shut down while connecting.
        control.signal_stop();
        if let Some(task) = control.task {
            let _ = task.await;
        }
        Err(ForkError::RegistryClosed)
    }

    /// Ask a worker to stop. The worker finishes its current frame first.
    pub fn stop(&self, id: WorkerId) -> Result<()> {
        let workers = self.inner.workers.lock();
        let control = workers
            .get(&id)
            .filter(|w| w.is_live())
            .ok_or(ForkError::UnknownWorker(id))?;
        if control.signal_stop() {
            debug!(%id, "Stop requested");
        }
        Ok(())
    }

    /// Stop every live worker attached to `session`. Returns how many were signalled.
    pub fn stop_session(&self, session: &str) -> usize {
        let workers = self.inner.workers.lock();
        workers
            .values()
            .filter(|w| w.is_live() && w.descriptor.session_name() == session)
            .map(|w| w.signal_stop())
            .count()
    }

    /// Live workers attached to `session`.
    pub fn list(&self, session: &str) -> Vec<WorkerInfo> {
        self.collect(|w| w.descriptor.session_name() == session)
    }

    /// All live workers.
    pub fn list_all(&self) -> Vec<WorkerInfo> {
        self.collect(|_| true)
    }

    fn collect(&self, keep: impl Fn(&WorkerControl) -> bool) -> Vec<WorkerInfo> {
        let workers = self.inner.workers.lock();
        let mut infos: Vec<_> = workers
            .iter()
            .filter(|(_, w)| w.is_live() && keep(w))
            .map(|(id, w)| w.info(*id))
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Mute or unmute a leg of a running fork.
    pub fn mute(&self, id: WorkerId, direction: Direction, on: bool) -> Result<()> {
        let workers = self.inner.workers.lock();
        let control = workers
            .get(&id)
            .filter(|w| w.is_live())
            .ok_or(ForkError::UnknownWorker(id))?;
        control.source.apply_mute(direction, on);
        debug!(%id, %direction, on, "Mute updated");
        Ok(())
    }

    /// Read an attribute of a running fork.
    ///
    /// `endpoint` (or its alias `filename`) returns the endpoint URL.
    pub fn query_attribute(&self, id: WorkerId, key: &str) -> Result<String> {
        let workers = self.inner.workers.lock();
        let control = workers
            .get(&id)
            .filter(|w| w.is_live())
            .ok_or(ForkError::UnknownWorker(id))?;

        match key.to_ascii_lowercase().as_str() {
            "endpoint" | "filename" => Ok(control.descriptor.endpoint().to_string()),
            _ => Err(ForkError::UnknownAttribute(key.to_string())),
        }
    }

    /// Wait for a worker to finish and take its report.
    ///
    /// Does not stop the worker; call [`Self::stop`] first for that.
    pub async fn join(&self, id: WorkerId) -> Result<PumpReport> {
        let task = {
            let mut workers = self.inner.workers.lock();
            workers
                .get_mut(&id)
                .and_then(|w| w.task.take())
                .ok_or(ForkError::UnknownWorker(id))?
        };

        let result = task.await;
        self.inner.workers.lock().remove(&id);
        result.map_err(|e| ForkError::WorkerAborted(e.to_string()))
    }

    /// Stop accepting new forks, stop every worker and wait for all of them.
    pub async fn shutdown(&self) -> Vec<PumpReport> {
        self.inner.closed.store(true, Ordering::Release);

        let mut drained: Vec<_> = self.inner.workers.lock().drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        info!(workers = drained.len(), "Shutting down audio forks");

        for (_, control) in &drained {
            control.signal_stop();
        }

        let mut reports = Vec::with_capacity(drained.len());
        for (id, mut control) in drained {
            let Some(task) = control.task.take() else {
                continue;
            };
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(%id, error = %e, "Worker aborted"),
            }
        }
        reports
    }

    /// Number of live workers.
    pub fn len(&self) -> usize {
        self.inner
            .workers
            .lock()
            .values()
            .filter(|w| w.is_live())
            .count()
    }

    /// Check if no worker is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if [`Self::shutdown`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl<T: Transport> Clone for ForkRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for ForkRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkRegistry")
            .field("workers", &self.inner.workers.lock().len())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BeepOptions;
    use crate::frame::Frame;
    use crate::pump::TerminationReason;
    use crate::source::{ChannelFrameSource, FrameFeeder, channel_source};
    use crate::testing::ScriptedTransport;
    use crate::types::{SourceStatus, VolumeAdjust};
    use bytes::Bytes;
    use std::time::Duration;

    const ENDPOINT: &str = "ws://127.0.0.1:9/fork";

    fn descriptor(session: &str) -> SessionDescriptor {
        SessionDescriptor::builder(ENDPOINT)
            .with_reconnect(1, Duration::from_millis(10))
            .build(session)
            .unwrap()
    }

    fn source(session: &str) -> (FrameFeeder, Arc<ChannelFrameSource>) {
        let (feeder, source) = channel_source(session, 16);
        (feeder, Arc::new(source))
    }

    fn registry() -> (ScriptedTransport, ForkRegistry<ScriptedTransport>) {
        let transport = ScriptedTransport::new();
        (transport.clone(), ForkRegistry::new(transport))
    }

    async fn wait_for_sent(transport: &ScriptedTransport, count: usize) {
        while transport.sent().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_and_finish() {
        let (transport, registry) = registry();
        let (feeder, source) = source("SIP/alice-0001");

        let id = registry
            .start(descriptor("SIP/alice-0001"), source)
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);

        for n in 0..5u8 {
            feeder
                .send(Frame::new(Direction::Both, Bytes::from(vec![n, 0])))
                .await
                .unwrap();
        }
        feeder.finish();

        let report = registry.join(id).await.unwrap();
        assert_eq!(report.frames_sent, 5);
        assert_eq!(report.reason, TerminationReason::SourceFinished(SourceStatus::Done));
        assert_eq!(transport.sent().len(), 5);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.join(id).await,
            Err(ForkError::UnknownWorker(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_connect_creates_no_worker() {
        let (transport, registry) = registry();
        transport.fail_connects(1);
        let (feeder, source) = source("SIP/alice-0001");

        let result = registry.start(descriptor("SIP/alice-0001"), source).await;

        assert!(matches!(result, Err(ForkError::Connect(_))));
        assert!(registry.is_empty());
        assert!(registry.list_all().is_empty());
        assert!(feeder.is_detached());
    }

    #[tokio::test]
    async fn test_rejects_stopped_source() {
        let (transport, registry) = registry();
        let (_feeder, source) = source("SIP/alice-0001");
        source.request_shutdown();

        let result = registry.start(descriptor("SIP/alice-0001"), source).await;
        assert!(matches!(result, Err(ForkError::SourceNotRunning)));
        assert!(transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_start_applies_volume_and_beep() {
        let (transport, registry) = registry();
        let (feeder, source) = source("SIP/alice-0001");
        let descriptor = SessionDescriptor::builder(ENDPOINT)
            .with_volume(VolumeAdjust::new(1, 0).unwrap())
            .with_beep(BeepOptions {
                on_start: true,
                on_stop: true,
            })
            .build("SIP/alice-0001")
            .unwrap();

        let id = registry.start(descriptor, source).await.unwrap();
        assert_eq!(feeder.beeps(), 1);

        feeder
            .send(Frame::new(Direction::In, Bytes::from_static(&[10, 0])))
            .await
            .unwrap();
        wait_for_sent(&transport, 1).await;
        assert_eq!(transport.sent(), vec![Bytes::from_static(&[20, 0])]);

        registry.stop(id).unwrap();
        registry.join(id).await.unwrap();
        assert_eq!(feeder.beeps(), 2);
    }

    #[tokio::test]
    async fn test_list_query_and_mute() {
        let (transport, registry) = registry();
        let (_feeder_a, source_a) = source("SIP/alice-0001");
        let (feeder_b, source_b) = source("SIP/bob-0002");

        let a = registry
            .start(descriptor("SIP/alice-0001"), source_a)
            .await
            .unwrap();
        let b = registry
            .start(descriptor("SIP/bob-0002"), source_b)
            .await
            .unwrap();

        let listed = registry.list("SIP/bob-0002");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b);
        assert_eq!(listed[0].endpoint.as_str(), ENDPOINT);
        assert_eq!(listed[0].direction, Direction::Both);
        assert_eq!(registry.list_all().len(), 2);

        assert_eq!(registry.query_attribute(a, "endpoint").unwrap(), ENDPOINT);
        assert_eq!(registry.query_attribute(a, "filename").unwrap(), ENDPOINT);
        assert!(matches!(
            registry.query_attribute(a, "codec"),
            Err(ForkError::UnknownAttribute(_))
        ));

        registry.mute(b, Direction::In, true).unwrap();
        feeder_b
            .send(Frame::new(Direction::In, Bytes::from_static(&[7, 7, 7, 7])))
            .await
            .unwrap();
        wait_for_sent(&transport, 1).await;
        assert_eq!(transport.sent(), vec![Bytes::from_static(&[0, 0, 0, 0])]);

        let reports = registry.shutdown().await;
        assert_eq!(reports.len(), 2);
    }

    #[tokio::test]
    async fn test_mute_one_leg_silences_mixed_audio() {
        let (transport, registry) = registry();
        let (feeder, source) = source("SIP/alice-0001");
        let id = registry
            .start(descriptor("SIP/alice-0001"), source)
            .await
            .unwrap();

        registry.mute(id, Direction::In, true).unwrap();
        feeder
            .send(Frame::new(Direction::Both, Bytes::from_static(&[5, 5])))
            .await
            .unwrap();
        wait_for_sent(&transport, 1).await;
        registry.mute(id, Direction::In, false).unwrap();
        feeder
            .send(Frame::new(Direction::Both, Bytes::from_static(&[5, 5])))
            .await
            .unwrap();
        wait_for_sent(&transport, 2).await;

        assert_eq!(
            transport.sent(),
            vec![Bytes::from_static(&[0, 0]), Bytes::from_static(&[5, 5])]
        );
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_worker() {
        let (_transport, registry) = registry();
        let id = WorkerId::new();

        assert!(matches!(registry.stop(id), Err(ForkError::UnknownWorker(_))));
        assert!(matches!(
            registry.mute(id, Direction::Both, true),
            Err(ForkError::UnknownWorker(_))
        ));
        assert!(matches!(
            registry.query_attribute(id, "endpoint"),
            Err(ForkError::UnknownWorker(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_session() {
        let (_transport, registry) = registry();
        let mut ids = Vec::new();
        let mut feeders = Vec::new();
        for session in ["SIP/alice-0001", "SIP/alice-0001", "SIP/bob-0002"] {
            let (feeder, source) = source(session);
            ids.push(registry.start(descriptor(session), source).await.unwrap());
            feeders.push(feeder);
        }

        assert_eq!(registry.stop_session("SIP/alice-0001"), 2);
        for id in &ids[..2] {
            let report = registry.join(*id).await.unwrap();
            assert!(report.reason.is_clean());
        }

        let remaining = registry.list_all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ids[2]);
        assert_eq!(registry.stop_session("SIP/nobody"), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_transport, registry) = registry();
        let (_feeder, source) = source("SIP/alice-0001");
        let id = registry
            .start(descriptor("SIP/alice-0001"), source)
            .await
            .unwrap();

        assert!(registry.stop(id).is_ok());
        assert!(registry.stop(id).is_ok());
        assert_eq!(registry.len(), 1);
        let report = registry.join(id).await.unwrap();
        assert!(report.reason.is_clean());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_forks() {
        let (transport, registry) = registry();
        let (_first_feeder, first_source) = source("SIP/alice-0001");
        registry
            .start(descriptor("SIP/alice-0001"), first_source)
            .await
            .unwrap();

        let reports = registry.shutdown().await;
        assert_eq!(reports.len(), 1);
        assert!(registry.is_closed());
        assert!(registry.is_empty());

        let (_feeder, source) = source("SIP/alice-0001");
        assert!(matches!(
            registry.start(descriptor("SIP/alice-0001"), source).await,
            Err(ForkError::RegistryClosed)
        ));
        assert_eq!(transport.attempts().len(), 1);
    }
}
