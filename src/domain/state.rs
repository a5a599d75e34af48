use crate::domain::ordering::SessionOrdering;
use crate::foundation::PeerId;

/// Phase of one Bully instance within its session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    Electing,
    WaitingForAlive,
    Coordinator,
    Follower,
    Stopped,
}

impl Phase {
    /// A settled phase means a coordinator is believed and the liveness
    /// monitor is the only thing that can unseat it.
    pub fn is_settled(&self) -> bool {
        matches!(self, Phase::Coordinator | Phase::Follower)
    }

    pub fn is_electing(&self) -> bool {
        matches!(self, Phase::Electing | Phase::WaitingForAlive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Electing => "electing",
            Phase::WaitingForAlive => "waiting_for_alive",
            Phase::Coordinator => "coordinator",
            Phase::Follower => "follower",
            Phase::Stopped => "stopped",
        }
    }
}

/// Per-peer, per-session election state. Mutated only by the owning
/// event loop; the ordering and peer set are fixed at construction.
#[derive(Debug)]
pub struct BullyState {
    self_peer: PeerId,
    ordering: SessionOrdering,
    pub phase: Phase,
    pub coordinator: Option<PeerId>,
    ping_misses: u32,
}

impl BullyState {
    pub fn new(self_peer: PeerId, ordering: SessionOrdering) -> Self {
        Self { self_peer, ordering, phase: Phase::Idle, coordinator: None, ping_misses: 0 }
    }

    pub fn self_peer(&self) -> &PeerId {
        &self.self_peer
    }

    pub fn ordering(&self) -> &SessionOrdering {
        &self.ordering
    }

    pub fn is_member(&self, peer: &PeerId) -> bool {
        self.ordering.contains(peer)
    }

    /// Peers that outrank us, strongest first.
    pub fn higher_ranked(&self) -> &[PeerId] {
        self.ordering.higher_ranked_than(&self.self_peer)
    }

    /// A remote `COORDINATOR` announcement is adopted when the sender
    /// outranks us, or when it outranks whoever we currently believe in.
    pub fn should_accept_coordinator(&self, from: &PeerId) -> bool {
        if self.ordering.outranks(from, &self.self_peer) {
            return true;
        }
        match &self.coordinator {
            Some(current) => self.ordering.outranks(from, current),
            None => false,
        }
    }

    pub fn adopt_coordinator(&mut self, from: PeerId) {
        self.coordinator = Some(from);
        self.phase = Phase::Follower;
        self.ping_misses = 0;
    }

    pub fn become_coordinator(&mut self) {
        self.coordinator = Some(self.self_peer.clone());
        self.phase = Phase::Coordinator;
        self.ping_misses = 0;
    }

    pub fn invalidate_coordinator(&mut self) {
        self.coordinator = None;
        self.ping_misses = 0;
    }

    pub fn record_pong(&mut self) {
        self.ping_misses = 0;
    }

    /// Returns true once the consecutive miss count reaches `threshold`.
    pub fn record_ping_miss(&mut self, threshold: u32) -> bool {
        self.ping_misses = self.ping_misses.saturating_add(1);
        self.ping_misses >= threshold
    }

    pub fn ping_misses(&self) -> u32 {
        self.ping_misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::SessionId;

    fn state_for(self_peer: &str, peers: &[&str]) -> BullyState {
        let peers: Vec<PeerId> = peers.iter().map(|id| PeerId::from(*id)).collect();
        let ordering = SessionOrdering::new(&SessionId::from("test-session"), &peers);
        BullyState::new(PeerId::from(self_peer), ordering)
    }

    #[test]
    fn leader_has_no_higher_ranked_peers() {
        let peers = ["r1", "r2", "r3"];
        let probe = state_for("r1", &peers);
        let leader = probe.ordering().leader().expect("leader").clone();
        let state = state_for(leader.as_str(), &peers);
        assert!(state.higher_ranked().is_empty());
    }

    #[test]
    fn lowest_ranked_peer_sees_everyone_above() {
        let peers = ["r1", "r2", "r3"];
        let probe = state_for("r1", &peers);
        let lowest = probe.ordering().ranked().last().expect("lowest").clone();
        let state = state_for(lowest.as_str(), &peers);
        assert_eq!(state.higher_ranked().len(), 2);
    }

    #[test]
    fn accepts_coordinator_only_from_stronger_claim() {
        let peers = ["r1", "r2", "r3"];
        let probe = state_for("r1", &peers);
        let ranked: Vec<PeerId> = probe.ordering().ranked().to_vec();
        let mut state = state_for(ranked[1].as_str(), &peers);

        // The top peer always wins.
        assert!(state.should_accept_coordinator(&ranked[0]));
        // A weaker peer does not, even before any coordinator is known.
        assert!(!state.should_accept_coordinator(&ranked[2]));

        // Once a weaker coordinator is believed, a stronger one supersedes it.
        state.adopt_coordinator(ranked[2].clone());
        assert!(state.should_accept_coordinator(&ranked[0]));
    }

    #[test]
    fn becoming_coordinator_points_at_self() {
        let mut state = state_for("r1", &["r1", "r2"]);
        state.become_coordinator();
        assert_eq!(state.phase, Phase::Coordinator);
        assert_eq!(state.coordinator.as_deref(), Some("r1"));
    }

    #[test]
    fn ping_miss_threshold_triggers_once_reached() {
        let mut state = state_for("r1", &["r1", "r2"]);
        state.adopt_coordinator(PeerId::from("r2"));
        assert!(!state.record_ping_miss(2));
        assert!(state.record_ping_miss(2));
        state.record_pong();
        assert_eq!(state.ping_misses(), 0);
    }
}
