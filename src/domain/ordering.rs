use crate::foundation::{PeerId, SessionId};

/// Deterministic rank score for one peer in one session.
///
/// Every honest peer computes the same digest for the same
/// `(session_id, peer_id)` pair, so the fleet agrees on the order
/// without exchanging a single message.
fn rank_score(session_id: &SessionId, peer_id: &PeerId) -> [u8; 32] {
    const DOMAIN: &[u8] = b"relay-elector:session_rank:v1:";
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN);
    hasher.update(session_id.as_str().as_bytes());
    hasher.update(peer_id.as_str().as_bytes());
    *hasher.finalize().as_bytes()
}

/// Returns `peers` sorted by descending rank for `session_id`.
///
/// Element 0 is the natural coordinator absent failures. Ties on the
/// digest (only possible for duplicate ids) break on the peer id
/// itself, keeping the order strict.
pub fn rank_peers(session_id: &SessionId, peers: &[PeerId]) -> Vec<PeerId> {
    let mut ranked: Vec<PeerId> = peers.to_vec();
    ranked.sort_by_cached_key(|peer| (rank_score(session_id, peer), peer.clone()));
    ranked.dedup();
    ranked
}

/// Total order over the peers of one session, precomputed once per
/// election round.
#[derive(Clone, Debug)]
pub struct SessionOrdering {
    ranked: Vec<PeerId>,
}

impl SessionOrdering {
    pub fn new(session_id: &SessionId, peers: &[PeerId]) -> Self {
        Self { ranked: rank_peers(session_id, peers) }
    }

    /// Peers in descending rank.
    pub fn ranked(&self) -> &[PeerId] {
        &self.ranked
    }

    pub fn leader(&self) -> Option<&PeerId> {
        self.ranked.first()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.ranked.iter().any(|p| p == peer)
    }

    fn index_of(&self, peer: &PeerId) -> Option<usize> {
        self.ranked.iter().position(|p| p == peer)
    }

    /// True when `a` holds a strictly stronger claim to coordinator
    /// than `b`. Peers outside the session never outrank anyone.
    pub fn outranks(&self, a: &PeerId, b: &PeerId) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(ia), Some(ib)) => ia < ib,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Peers holding a stronger claim than `peer`, strongest first.
    pub fn higher_ranked_than(&self, peer: &PeerId) -> &[PeerId] {
        match self.index_of(peer) {
            Some(idx) => &self.ranked[..idx],
            None => &self.ranked,
        }
    }
}
