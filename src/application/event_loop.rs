use crate::domain::{BullyState, Phase};
use crate::foundation::{PeerId, SessionId};
use crate::infrastructure::config::ElectorConfig;
use crate::infrastructure::transport::{ElectionMessage, MessageEnvelope, Messaging, MessagingSubscription};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Commands the driver feeds into the loop.
#[derive(Debug)]
pub(crate) enum LoopCommand {
    StartElection,
}

/// Snapshot of the state machine published after every transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElectorStatus {
    pub phase: Phase,
    pub coordinator: Option<PeerId>,
}

impl ElectorStatus {
    pub(crate) fn initial() -> Self {
        Self { phase: Phase::Idle, coordinator: None }
    }

    /// A coordinator is believed and the monitor has not unseated it.
    pub fn is_settled(&self) -> bool {
        self.phase.is_settled() && self.coordinator.is_some()
    }
}

/// Sleeps until `deadline`, or forever when the timer is unarmed.
async fn deadline_tick(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Single-writer event loop for one `(session, host)` Bully instance.
///
/// Every state mutation happens on this task: inbound envelopes, timer
/// expiries, driver commands, and cancellation are serialized through
/// one `select`. Outbound sends are fired onto a worker so the loop
/// never blocks on the transport.
pub(crate) struct EventLoop {
    session_id: SessionId,
    state: BullyState,
    config: ElectorConfig,
    messaging: Arc<dyn Messaging>,
    inbox: MessagingSubscription,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    status: watch::Sender<ElectorStatus>,
    cancel: CancellationToken,
    alive_wait_deadline: Option<Instant>,
    coordinator_wait_deadline: Option<Instant>,
    retry_deadline: Option<Instant>,
    ping_deadline: Option<Instant>,
    pong_wait_deadline: Option<Instant>,
}

impl EventLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: SessionId,
        state: BullyState,
        config: ElectorConfig,
        messaging: Arc<dyn Messaging>,
        inbox: MessagingSubscription,
        commands: mpsc::UnboundedReceiver<LoopCommand>,
        status: watch::Sender<ElectorStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            state,
            config,
            messaging,
            inbox,
            commands,
            status,
            cancel,
            alive_wait_deadline: None,
            coordinator_wait_deadline: None,
            retry_deadline: None,
            ping_deadline: None,
            pong_wait_deadline: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            peer_count = self.state.ordering().ranked().len(),
            "elector event loop started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.enter_stopped("cancelled");
                    break;
                }
                item = self.inbox.next() => match item {
                    Some(Ok(envelope)) => self.handle_envelope(envelope),
                    Some(Err(err)) => {
                        warn!(session_id = %self.session_id, error = %err, "inbound stream error");
                    }
                    None => {
                        self.enter_stopped("subscription closed");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(LoopCommand::StartElection) => self.on_start_election_command(),
                    None => {
                        self.enter_stopped("elector dropped");
                        break;
                    }
                },
                _ = deadline_tick(self.alive_wait_deadline) => self.on_alive_wait_expired(),
                _ = deadline_tick(self.coordinator_wait_deadline) => self.on_coordinator_wait_expired(),
                _ = deadline_tick(self.retry_deadline) => self.on_retry_due(),
                _ = deadline_tick(self.ping_deadline) => self.on_ping_due(),
                _ = deadline_tick(self.pong_wait_deadline) => self.on_pong_wait_expired(),
            }
        }
    }

    // --- inbound ---------------------------------------------------------

    fn handle_envelope(&mut self, envelope: MessageEnvelope) {
        if envelope.session_id != self.session_id {
            warn!(
                session_id = %self.session_id,
                envelope_session = %envelope.session_id,
                "dropping envelope for foreign session"
            );
            return;
        }
        if !self.state.is_member(&envelope.sender) {
            warn!(
                session_id = %self.session_id,
                sender = %envelope.sender,
                "dropping envelope from peer outside the session"
            );
            return;
        }

        debug!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            sender = %envelope.sender,
            message = envelope.message.as_str(),
            phase = self.state.phase.as_str(),
            "message received"
        );

        // A malformed or unexpected message must not take the loop down:
        // catch the handler, log, drop the message.
        let sender = envelope.sender.clone();
        let message = envelope.message;
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| self.apply_message(envelope))) {
            warn!(
                session_id = %self.session_id,
                sender = %sender,
                message = message.as_str(),
                panic = ?panic,
                "message handler panicked, dropping message"
            );
        }
    }

    fn apply_message(&mut self, envelope: MessageEnvelope) {
        match envelope.message {
            ElectionMessage::Election => self.on_election(envelope.sender),
            ElectionMessage::Alive => self.on_alive(envelope.sender),
            ElectionMessage::Coordinator => self.on_coordinator(envelope.sender),
            ElectionMessage::Ping => self.on_ping(envelope.sender),
            ElectionMessage::Pong => self.on_pong(envelope.sender),
        }
    }

    fn on_election(&mut self, from: PeerId) {
        // Whoever asks gets told we are alive; ELECTION only ever targets
        // peers that outrank the initiator.
        self.send_direct(from, ElectionMessage::Alive);
        if !self.state.phase.is_electing() {
            self.start_election();
        }
    }

    fn on_alive(&mut self, from: PeerId) {
        if self.state.phase != Phase::WaitingForAlive {
            debug!(session_id = %self.session_id, sender = %from, phase = self.state.phase.as_str(), "ignoring stray ALIVE");
            return;
        }
        // A stronger peer is up: stand down and give it one election
        // window to announce itself.
        self.alive_wait_deadline = None;
        self.state.phase = Phase::Follower;
        self.coordinator_wait_deadline = Some(Instant::now() + self.config.election_wait_time());
        self.publish_status();
        debug!(session_id = %self.session_id, sender = %from, "standing down, awaiting COORDINATOR");
    }

    fn on_coordinator(&mut self, from: PeerId) {
        if !self.state.should_accept_coordinator(&from) {
            debug!(
                session_id = %self.session_id,
                sender = %from,
                current = ?self.state.coordinator.as_ref().map(|p| p.as_str()),
                "ignoring COORDINATOR from weaker claim"
            );
            return;
        }
        self.state.adopt_coordinator(from.clone());
        self.clear_election_timers();
        self.pong_wait_deadline = None;
        self.ping_deadline = Some(Instant::now() + self.config.ping_interval());
        self.publish_status();
        info!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            coordinator = %from,
            "accepted coordinator"
        );
    }

    fn on_ping(&mut self, from: PeerId) {
        if self.state.phase == Phase::Coordinator {
            self.send_direct(from, ElectionMessage::Pong);
        } else {
            debug!(session_id = %self.session_id, sender = %from, phase = self.state.phase.as_str(), "ignoring PING while not coordinator");
        }
    }

    fn on_pong(&mut self, from: PeerId) {
        debug!(session_id = %self.session_id, sender = %from, "coordinator is alive");
        self.state.record_pong();
        self.pong_wait_deadline = None;
        self.ping_deadline = Some(Instant::now() + self.config.ping_interval());
    }

    // --- timers ----------------------------------------------------------

    fn on_alive_wait_expired(&mut self) {
        self.alive_wait_deadline = None;
        if self.state.phase != Phase::WaitingForAlive {
            return;
        }
        // Nobody above us answered: the session is ours.
        debug!(session_id = %self.session_id, peer_id = %self.state.self_peer(), "no ALIVE from higher-ranked peers");
        self.declare_victory();
    }

    fn on_coordinator_wait_expired(&mut self) {
        self.coordinator_wait_deadline = None;
        if self.state.coordinator.is_some() {
            // Still believing a coordinator from before this round; make
            // sure the ping cycle towards it is running again.
            if self.state.phase == Phase::Follower && self.ping_deadline.is_none() && self.pong_wait_deadline.is_none() {
                self.ping_deadline = Some(Instant::now() + self.config.ping_interval());
            }
            return;
        }
        // A higher peer said ALIVE but never announced itself. Back off,
        // then run the election again.
        info!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            back_off_ms = self.config.ping_back_off_ms,
            "no COORDINATOR after ALIVE, scheduling retry"
        );
        self.state.phase = Phase::Electing;
        self.retry_deadline = Some(Instant::now() + self.config.ping_back_off());
        self.publish_status();
    }

    fn on_retry_due(&mut self) {
        self.retry_deadline = None;
        if self.state.phase.is_settled() {
            return;
        }
        self.start_election();
    }

    fn on_ping_due(&mut self) {
        self.ping_deadline = None;
        if self.state.phase != Phase::Follower {
            return;
        }
        let Some(coordinator) = self.state.coordinator.clone() else {
            return;
        };
        self.send_direct(coordinator, ElectionMessage::Ping);
        self.pong_wait_deadline = Some(Instant::now() + self.config.ping_wait_time());
    }

    fn on_pong_wait_expired(&mut self) {
        self.pong_wait_deadline = None;
        if self.state.phase != Phase::Follower {
            return;
        }
        let threshold_reached = self.state.record_ping_miss(self.config.ping_miss_threshold);
        warn!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            coordinator = ?self.state.coordinator.as_ref().map(|p| p.as_str()),
            misses = self.state.ping_misses(),
            "coordinator missed PONG window"
        );
        if threshold_reached {
            self.state.invalidate_coordinator();
            self.publish_status();
            self.start_election();
        } else {
            self.ping_deadline = Some(Instant::now() + self.config.ping_interval());
        }
    }

    // --- transitions -----------------------------------------------------

    fn on_start_election_command(&mut self) {
        if self.state.phase.is_electing() {
            debug!(session_id = %self.session_id, "election already in progress");
            return;
        }
        if self.state.phase.is_settled() && self.state.coordinator.is_some() {
            debug!(session_id = %self.session_id, "coordinator already settled");
            return;
        }
        self.start_election();
    }

    fn start_election(&mut self) {
        self.clear_election_timers();
        let higher: Vec<PeerId> = self.state.higher_ranked().to_vec();
        if higher.is_empty() {
            self.declare_victory();
            return;
        }

        self.state.phase = Phase::WaitingForAlive;
        info!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            higher_ranked = higher.len(),
            "starting election"
        );
        for peer in higher {
            self.send_direct(peer, ElectionMessage::Election);
        }
        self.alive_wait_deadline = Some(Instant::now() + self.config.ping_wait_time());
        self.publish_status();
    }

    fn declare_victory(&mut self) {
        self.state.become_coordinator();
        self.clear_election_timers();
        self.ping_deadline = None;
        self.pong_wait_deadline = None;
        info!(
            session_id = %self.session_id,
            peer_id = %self.state.self_peer(),
            "declaring self coordinator"
        );
        self.send_broadcast(ElectionMessage::Coordinator);
        self.publish_status();
    }

    fn enter_stopped(&mut self, reason: &str) {
        self.state.phase = Phase::Stopped;
        self.clear_election_timers();
        self.ping_deadline = None;
        self.pong_wait_deadline = None;
        self.publish_status();
        info!(session_id = %self.session_id, peer_id = %self.state.self_peer(), reason, "elector stopped");
    }

    fn clear_election_timers(&mut self) {
        self.alive_wait_deadline = None;
        self.coordinator_wait_deadline = None;
        self.retry_deadline = None;
    }

    fn publish_status(&self) {
        let next = ElectorStatus { phase: self.state.phase, coordinator: self.state.coordinator.clone() };
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    // --- outbound --------------------------------------------------------

    fn send_direct(&self, to: PeerId, message: ElectionMessage) {
        let envelope = MessageEnvelope::direct(self.state.self_peer().clone(), self.session_id.clone(), to, message);
        self.dispatch(envelope);
    }

    fn send_broadcast(&self, message: ElectionMessage) {
        let envelope = MessageEnvelope::broadcast(self.state.self_peer().clone(), self.session_id.clone(), message);
        self.dispatch(envelope);
    }

    /// Fire-and-forget: a slow or failing transport never stalls the
    /// loop, and send failures are recovered through timers.
    fn dispatch(&self, envelope: MessageEnvelope) {
        debug!(
            session_id = %self.session_id,
            peer_id = %envelope.sender,
            recipient = ?envelope.recipient.as_ref().map(|p| p.as_str()),
            message = envelope.message.as_str(),
            "sending message"
        );
        let messaging = self.messaging.clone();
        tokio::spawn(async move {
            if let Err(err) = messaging.send(envelope).await {
                warn!(error = %err, "message send failed");
            }
        });
    }
}
