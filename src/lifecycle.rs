//! Shutdown handshake between the owning session and a fork worker.
//!
//! [`lifecycle`] returns two halves sharing one token. The owner keeps the
//! [`StopHandle`]: it may request a stop at any time and wait until the
//! worker acknowledges that it no longer touches the frame source. The worker
//! keeps the [`WorkerLifecycle`] and gives it up when acknowledging, so it
//! cannot touch the token again afterwards.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TokenState {
    active: bool,
    destruction_acknowledged: bool,
}

/// Create a connected owner/worker pair.
pub fn lifecycle() -> (StopHandle, WorkerLifecycle) {
    let (tx, _rx) = watch::channel(TokenState {
        active: true,
        destruction_acknowledged: false,
    });
    let state = Arc::new(tx);
    (
        StopHandle {
            state: state.clone(),
        },
        WorkerLifecycle {
            state,
            acknowledged: false,
        },
    )
}

/// Owner half of the lifecycle token.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<watch::Sender<TokenState>>,
}

impl StopHandle {
    /// Ask the worker to stop. Returns `true` only for the call that
    /// actually flipped the token; later calls have no effect.
    pub fn request_stop(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.active {
                s.active = false;
                true
            } else {
                false
            }
        })
    }

    /// Check if the worker may still run.
    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Check if the worker has acknowledged destruction.
    pub fn is_acknowledged(&self) -> bool {
        self.state.borrow().destruction_acknowledged
    }

    /// Wait until the worker has acknowledged destruction.
    pub async fn await_destruction_ack(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| s.destruction_acknowledged).await;
    }

    /// Like [`Self::await_destruction_ack`], giving up after `timeout`.
    ///
    /// Returns `true` if the acknowledgement arrived.
    pub async fn await_destruction_ack_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_destruction_ack())
            .await
            .is_ok()
    }
}

/// Worker half of the lifecycle token.
///
/// Dropping it without acknowledging (e.g. when the worker panics)
/// acknowledges implicitly so the owner is never left waiting.
#[derive(Debug)]
pub struct WorkerLifecycle {
    state: Arc<watch::Sender<TokenState>>,
    acknowledged: bool,
}

impl WorkerLifecycle {
    /// Check if the owner requested a stop.
    pub fn is_stop_requested(&self) -> bool {
        !self.state.borrow().active
    }

    /// Mark the worker as done with all shared state and wake the owner.
    ///
    /// Must be the last thing the worker does before releasing resources
    /// the owner may also reference.
    pub fn acknowledge_destruction(mut self) {
        self.acknowledge();
    }

    fn acknowledge(&mut self) {
        if !self.acknowledged {
            self.acknowledged = true;
            self.state.send_modify(|s| {
                s.active = false;
                s.destruction_acknowledged = true;
            });
        }
    }
}

impl Drop for WorkerLifecycle {
    fn drop(&mut self) {
        self.acknowledge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_is_idempotent() {
        let (stop, worker) = lifecycle();
        assert!(stop.is_active());
        assert!(!worker.is_stop_requested());

        assert!(stop.request_stop());
        assert!(!stop.request_stop());
        assert!(!stop.request_stop());

        assert!(!stop.is_active());
        assert!(worker.is_stop_requested());
        assert!(!stop.is_acknowledged());
    }

    #[tokio::test]
    async fn test_owner_waits_for_ack() {
        let (stop, worker) = lifecycle();
        let owner = {
            let stop = stop.clone();
            tokio::spawn(async move {
                stop.await_destruction_ack().await;
                stop.is_acknowledged()
            })
        };

        stop.request_stop();
        tokio::task::yield_now().await;
        assert!(!owner.is_finished());

        worker.acknowledge_destruction();
        assert!(owner.await.unwrap());
    }

    #[tokio::test]
    async fn test_ack_before_wait_returns_immediately() {
        let (stop, worker) = lifecycle();
        worker.acknowledge_destruction();
        assert!(
            stop.await_destruction_ack_timeout(Duration::from_millis(10))
                .await
        );
    }

    #[tokio::test]
    async fn test_drop_acknowledges() {
        let (stop, worker) = lifecycle();
        drop(worker);
        assert!(stop.is_acknowledged());
        assert!(!stop.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_ack() {
        let (stop, _worker) = lifecycle();
        assert!(
            !stop
                .await_destruction_ack_timeout(Duration::from_secs(1))
                .await
        );
    }
}
