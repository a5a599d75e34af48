//! In-process messaging over broadcast channels, one topic per session.
//! Backs the integration tests and any single-process deployment; the
//! real fleet injects a networked implementation of [`Messaging`].

use crate::foundation::{ElectorError, PeerId, Result, SessionId};
use crate::infrastructure::transport::{encoding, MessageEnvelope, Messaging, MessagingSubscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const TOPIC_CAPACITY: usize = 256;

pub struct MemoryHub {
    topics: Mutex<HashMap<SessionId, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()) }
    }

    async fn topic(&self, session_id: &SessionId) -> broadcast::Sender<Vec<u8>> {
        let mut guard = self.topics.lock().await;
        guard.entry(session_id.clone()).or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0).clone()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer's handle onto a [`MemoryHub`].
pub struct MemoryMessaging {
    hub: Arc<MemoryHub>,
    self_peer: PeerId,
}

impl MemoryMessaging {
    pub fn new(hub: Arc<MemoryHub>, self_peer: PeerId) -> Self {
        Self { hub, self_peer }
    }
}

#[async_trait]
impl Messaging for MemoryMessaging {
    async fn send(&self, envelope: MessageEnvelope) -> Result<()> {
        let bytes = encoding::encode_envelope(&envelope)?;
        let sender = self.hub.topic(&envelope.session_id).await;
        // `broadcast::Sender::send` errors when nobody subscribes yet. On a
        // real transport publishing into an empty session is not a fault,
        // so it is not one here either.
        let _ = sender.send(bytes);
        Ok(())
    }

    async fn subscribe(&self, session_id: SessionId) -> Result<MessagingSubscription> {
        let sender = self.hub.topic(&session_id).await;
        let mut receiver = sender.subscribe();
        let self_peer = self.self_peer.clone();
        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(bytes) => {
                        let envelope = match encoding::decode_envelope(&bytes) {
                            Ok(envelope) => envelope,
                            Err(err) => {
                                yield Err(err);
                                continue;
                            }
                        };
                        if envelope.sender == self_peer || !envelope.addressed_to(&self_peer) {
                            continue;
                        }
                        yield Ok(envelope);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(ElectorError::transport("recv", format!("memory transport lagged, skipped {skipped}")));
                    }
                }
            }
        };
        Ok(MessagingSubscription::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::ElectionMessage;

    #[tokio::test]
    async fn direct_envelopes_reach_only_the_recipient() {
        let hub = Arc::new(MemoryHub::new());
        let session = SessionId::from("s");
        let alice = MemoryMessaging::new(hub.clone(), PeerId::from("alice"));
        let bob = MemoryMessaging::new(hub.clone(), PeerId::from("bob"));
        let carol = MemoryMessaging::new(hub.clone(), PeerId::from("carol"));

        let mut bob_inbox = bob.subscribe(session.clone()).await.expect("subscribe");
        let mut carol_inbox = carol.subscribe(session.clone()).await.expect("subscribe");

        alice
            .send(MessageEnvelope::direct(PeerId::from("alice"), session.clone(), PeerId::from("bob"), ElectionMessage::Ping))
            .await
            .expect("send");
        alice
            .send(MessageEnvelope::broadcast(PeerId::from("alice"), session.clone(), ElectionMessage::Coordinator))
            .await
            .expect("send");

        let first = bob_inbox.next().await.expect("envelope").expect("ok");
        assert_eq!(first.message, ElectionMessage::Ping);
        let second = bob_inbox.next().await.expect("envelope").expect("ok");
        assert_eq!(second.message, ElectionMessage::Coordinator);

        // Carol never sees the direct ping, only the broadcast.
        let only = carol_inbox.next().await.expect("envelope").expect("ok");
        assert_eq!(only.message, ElectionMessage::Coordinator);
    }

    #[tokio::test]
    async fn own_messages_are_not_echoed_back() {
        let hub = Arc::new(MemoryHub::new());
        let session = SessionId::from("s");
        let alice = MemoryMessaging::new(hub.clone(), PeerId::from("alice"));
        let bob = MemoryMessaging::new(hub.clone(), PeerId::from("bob"));

        let mut alice_inbox = alice.subscribe(session.clone()).await.expect("subscribe");
        alice
            .send(MessageEnvelope::broadcast(PeerId::from("alice"), session.clone(), ElectionMessage::Election))
            .await
            .expect("send");
        bob.send(MessageEnvelope::broadcast(PeerId::from("bob"), session.clone(), ElectionMessage::Alive)).await.expect("send");

        let envelope = alice_inbox.next().await.expect("envelope").expect("ok");
        assert_eq!(envelope.sender, PeerId::from("bob"));
        assert_eq!(envelope.message, ElectionMessage::Alive);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let hub = Arc::new(MemoryHub::new());
        let alice = MemoryMessaging::new(hub.clone(), PeerId::from("alice"));
        let bob = MemoryMessaging::new(hub.clone(), PeerId::from("bob"));

        let mut inbox_a = bob.subscribe(SessionId::from("a")).await.expect("subscribe");
        alice
            .send(MessageEnvelope::broadcast(PeerId::from("alice"), SessionId::from("b"), ElectionMessage::Election))
            .await
            .expect("send");
        alice
            .send(MessageEnvelope::broadcast(PeerId::from("alice"), SessionId::from("a"), ElectionMessage::Ping))
            .await
            .expect("send");

        let envelope = inbox_a.next().await.expect("envelope").expect("ok");
        assert_eq!(envelope.session_id, SessionId::from("a"));
        assert_eq!(envelope.message, ElectionMessage::Ping);
    }
}
