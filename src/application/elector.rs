use crate::application::event_loop::{ElectorStatus, EventLoop, LoopCommand};
use crate::domain::{BullyState, Phase, SessionOrdering};
use crate::foundation::{ElectorError, PeerId, Result, SessionId};
use crate::infrastructure::config::ElectorConfig;
use crate::infrastructure::transport::Messaging;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone)]
struct LoopHandle {
    commands: mpsc::UnboundedSender<LoopCommand>,
    status: watch::Receiver<ElectorStatus>,
    cancel: CancellationToken,
}

/// Bully coordinator elector for one `(session, host)` pair.
///
/// The instance is cheap until the first `coordinator` call, which
/// subscribes to the session and spawns the event loop. Later calls
/// reuse the loop and normally hit the settled fast path.
pub struct BullyElector {
    session_id: SessionId,
    self_peer: PeerId,
    config: ElectorConfig,
    messaging: Arc<dyn Messaging>,
    handle: Mutex<Option<LoopHandle>>,
}

impl std::fmt::Debug for BullyElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BullyElector")
            .field("session_id", &self.session_id)
            .field("self_peer", &self.self_peer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BullyElector {
    pub fn new(session_id: SessionId, self_peer: PeerId, config: ElectorConfig, messaging: Arc<dyn Messaging>) -> Result<Self> {
        config.validate()?;
        Ok(Self { session_id, self_peer, config, messaging, handle: Mutex::new(None) })
    }

    /// Resolves the coordinator of this session among `peers`.
    ///
    /// Blocks until the fleet has converged on a coordinator that stayed
    /// stable for one election window, the `bully_wait_time` budget runs
    /// out, or `cancel` fires. The token passed by the first caller is
    /// the root of the event loop: cancelling it stops the instance for
    /// good, while a later caller's token only aborts that call.
    pub async fn coordinator(&self, cancel: &CancellationToken, peers: &[PeerId]) -> Result<PeerId> {
        if !peers.contains(&self.self_peer) {
            return Err(ElectorError::InvalidMembership {
                peer: self.self_peer.to_string(),
                session: self.session_id.to_string(),
            });
        }

        let handle = self.ensure_loop(cancel, peers).await?;
        let mut status_rx = handle.status.clone();

        let status = status_rx.borrow_and_update().clone();
        if status.phase == Phase::Stopped {
            return Err(ElectorError::Stopped);
        }
        if status.is_settled() {
            debug!(session_id = %self.session_id, coordinator = ?status.coordinator.as_ref().map(|p| p.as_str()), "fast path");
            return Ok(status.coordinator.expect("settled status carries a coordinator"));
        }

        handle.commands.send(LoopCommand::StartElection).map_err(|_| ElectorError::Stopped)?;

        let started = Instant::now();
        let deadline = started + self.config.bully_wait_time();

        loop {
            let status = status_rx.borrow_and_update().clone();
            if status.phase == Phase::Stopped {
                return Err(ElectorError::Stopped);
            }

            if status.is_settled() {
                // Grace period: a late COORDINATOR from a stronger peer
                // must still be able to supersede this result.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ElectorError::Cancelled),
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            return Err(ElectorError::Stopped);
                        }
                    }
                    _ = tokio::time::sleep(self.config.election_wait_time()) => {
                        return Ok(status.coordinator.expect("settled status carries a coordinator"));
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        return Err(self.timeout(started));
                    }
                }
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ElectorError::Cancelled),
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            return Err(ElectorError::Stopped);
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        return Err(self.timeout(started));
                    }
                }
            }
        }
    }

    /// Stops the event loop. Further `coordinator` calls return
    /// `Stopped`. Dropping the elector has the same effect.
    pub async fn stop(&self) {
        let guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            handle.cancel.cancel();
        }
    }

    async fn ensure_loop(&self, cancel: &CancellationToken, peers: &[PeerId]) -> Result<LoopHandle> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }

        let ordering = SessionOrdering::new(&self.session_id, peers);
        let state = BullyState::new(self.self_peer.clone(), ordering);
        let inbox = self.messaging.subscribe(self.session_id.clone()).await?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ElectorStatus::initial());
        let loop_cancel = cancel.child_token();

        let event_loop = EventLoop::new(
            self.session_id.clone(),
            state,
            self.config.clone(),
            self.messaging.clone(),
            inbox,
            command_rx,
            status_tx,
            loop_cancel.clone(),
        );
        tokio::spawn(event_loop.run());

        let handle = LoopHandle { commands: command_tx, status: status_rx, cancel: loop_cancel };
        *guard = Some(handle.clone());
        Ok(handle)
    }

    fn timeout(&self, started: Instant) -> ElectorError {
        ElectorError::ElectionTimeout { session: self.session_id.to_string(), waited_ms: started.elapsed().as_millis() as u64 }
    }
}
