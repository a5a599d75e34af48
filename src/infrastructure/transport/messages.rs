use crate::foundation::{PeerId, SessionId};
use serde::{Deserialize, Serialize};

/// The five Bully protocol messages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum ElectionMessage {
    /// Sent to each higher-ranked peer when an election starts.
    Election,
    /// Reply to `Election`: the sender is alive and outranks the
    /// initiator, who stands down and waits for `Coordinator`.
    Alive,
    /// The election winner's broadcast claim.
    Coordinator,
    /// Follower liveness probe towards the current coordinator.
    Ping,
    /// Coordinator's reply to `Ping`.
    Pong,
}

impl ElectionMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionMessage::Election => "election",
            ElectionMessage::Alive => "alive",
            ElectionMessage::Coordinator => "coordinator",
            ElectionMessage::Ping => "ping",
            ElectionMessage::Pong => "pong",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageEnvelope {
    pub sender: PeerId,
    pub session_id: SessionId,
    /// `None` addresses every peer of the session.
    pub recipient: Option<PeerId>,
    pub message: ElectionMessage,
    pub timestamp_nanos: u64,
}

impl MessageEnvelope {
    pub fn direct(sender: PeerId, session_id: SessionId, recipient: PeerId, message: ElectionMessage) -> Self {
        Self { sender, session_id, recipient: Some(recipient), message, timestamp_nanos: crate::foundation::now_nanos() }
    }

    pub fn broadcast(sender: PeerId, session_id: SessionId, message: ElectionMessage) -> Self {
        Self { sender, session_id, recipient: None, message, timestamp_nanos: crate::foundation::now_nanos() }
    }

    /// Whether `peer` should see this envelope.
    pub fn addressed_to(&self, peer: &PeerId) -> bool {
        match &self.recipient {
            Some(recipient) => recipient == peer,
            None => true,
        }
    }
}
