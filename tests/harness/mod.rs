#![allow(dead_code)]

use relay_elector::{rank_peers, BullyElector, CancellationToken, ElectorConfig, MemoryHub, MemoryMessaging, PeerId, Result, SessionId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Millisecond-scaled timing so a full fleet converges in well under a
/// second while preserving the production timeout hierarchy.
pub fn fast_config() -> ElectorConfig {
    ElectorConfig {
        ping_interval_ms: 100,
        ping_wait_time_ms: 100,
        ping_back_off_ms: 100,
        election_wait_time_ms: 300,
        bully_wait_time_ms: 10_000,
        ping_miss_threshold: 1,
    }
}

/// A fleet of relayers sharing one session over an in-process hub.
pub struct TestFleet {
    pub session_id: SessionId,
    pub hub: Arc<MemoryHub>,
    pub peers: Vec<PeerId>,
    pub electors: Vec<Arc<BullyElector>>,
    pub cancel: CancellationToken,
}

impl TestFleet {
    pub fn new(session: &str, count: usize) -> Self {
        let session_id = SessionId::from(session);
        let hub = Arc::new(MemoryHub::new());
        let mut peers = Vec::with_capacity(count);
        let mut electors = Vec::with_capacity(count);
        for idx in 0..count {
            let peer = PeerId::from(format!("relayer-{}", idx + 1));
            let messaging = Arc::new(MemoryMessaging::new(hub.clone(), peer.clone()));
            let elector =
                BullyElector::new(session_id.clone(), peer.clone(), fast_config(), messaging).expect("elector config");
            peers.push(peer);
            electors.push(Arc::new(elector));
        }
        Self { session_id, hub, peers, electors, cancel: CancellationToken::new() }
    }

    /// Peers in descending rank for this session.
    pub fn ranked(&self) -> Vec<PeerId> {
        rank_peers(&self.session_id, &self.peers)
    }

    pub fn index_of(&self, peer: &PeerId) -> usize {
        self.peers.iter().position(|p| p == peer).expect("peer in fleet")
    }

    /// Kicks off `coordinator` on one relayer after `delay`.
    pub fn spawn_coordinator(&self, idx: usize, delay: Duration) -> JoinHandle<Result<PeerId>> {
        let elector = self.electors[idx].clone();
        let peers = self.peers.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            elector.coordinator(&cancel, &peers).await
        })
    }

    /// Runs `coordinator` on every relayer with per-index delays and
    /// returns the results in fleet order.
    pub async fn elect_all(&self, delays: &[u64]) -> Vec<PeerId> {
        assert_eq!(delays.len(), self.electors.len());
        let handles: Vec<_> =
            delays.iter().enumerate().map(|(idx, ms)| self.spawn_coordinator(idx, Duration::from_millis(*ms))).collect();
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.expect("task").expect("coordinator"));
        }
        results
    }
}

pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
