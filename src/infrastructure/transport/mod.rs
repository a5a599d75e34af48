pub mod encoding;
pub mod memory;
pub mod messages;

use crate::foundation::{Result, SessionId};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

pub use messages::{ElectionMessage, MessageEnvelope};

/// Inbound message stream scoped to one session.
///
/// Error items are transient transport faults (lag, decode failures);
/// consumers log and keep reading. `None` means the transport is gone.
pub struct MessagingSubscription {
    inner: BoxStream<'static, Result<MessageEnvelope>>,
}

impl MessagingSubscription {
    pub fn new(inner: BoxStream<'static, Result<MessageEnvelope>>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<Result<MessageEnvelope>> {
        self.inner.next().await
    }
}

/// The elector's only side-effecting dependency: typed best-effort
/// messaging between authenticated peers, isolated by session id.
///
/// `send` returns once the envelope is queued; delivery is not
/// guaranteed and the state machine recovers lost messages through
/// timers. `subscribe` must never yield envelopes for other sessions.
#[async_trait]
pub trait Messaging: Send + Sync {
    async fn send(&self, envelope: MessageEnvelope) -> Result<()>;
    async fn subscribe(&self, session_id: SessionId) -> Result<MessagingSubscription>;
}
